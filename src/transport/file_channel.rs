//! File operations on the remote host built from POSIX shell snippets.
//!
//! Every helper exits with [`MISSING_STATUS`] when the target does not
//! exist, so an absent file is reported as `None` rather than an error.

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use shell_escape::unix::escape;

use super::{CommandResult, FileKind, Transport, TransportError};

/// Exit status the helpers use to signal "no such file or directory".
pub const MISSING_STATUS: i32 = 44;

/// Scoped file handle over a [`Transport`].
#[derive(Debug)]
pub struct FileChannel<'a, T: Transport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> FileChannel<'a, T> {
    /// Opens a file channel on `transport`.
    #[must_use]
    pub const fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Reports whether `path` exists and what kind of entry it is.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the remote helper cannot run.
    pub fn stat(&self, path: &str) -> Result<Option<FileKind>, TransportError> {
        let quoted = quote(path);
        let script = format!(
            "if [ -d {quoted} ]; then echo d; elif [ -e {quoted} ]; then echo f; else exit {MISSING_STATUS}; fi"
        );
        let Some(result) = self.run_optional("stat", path, &script)? else {
            return Ok(None);
        };
        if result.stdout.trim() == "d" {
            Ok(Some(FileKind::Directory))
        } else {
            Ok(Some(FileKind::File))
        }
    }

    /// Creates `path` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::FileChannel`] when `mkdir` fails.
    pub fn mkdir(&self, path: &str) -> Result<(), TransportError> {
        let script = format!("mkdir -p -- {}", quote(path));
        self.run_required("mkdir", path, &script).map(|_| ())
    }

    /// Reads the whole file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the read fails for any reason other
    /// than the file being absent.
    pub fn read(&self, path: &str) -> Result<Option<String>, TransportError> {
        let quoted = quote(path);
        let script = format!("[ -f {quoted} ] || exit {MISSING_STATUS}; cat -- {quoted}");
        Ok(self
            .run_optional("read", path, &script)?
            .map(|result| result.stdout))
    }

    /// Replaces the file at `path` with `contents`.
    ///
    /// The contents travel on the remote shell's standard input and land in
    /// a temporary sibling that is renamed over the target, so readers never
    /// observe a partially written file. Size is bounded only by the host.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::FileChannel`] when the write fails.
    pub fn write(&self, path: &str, contents: &str) -> Result<(), TransportError> {
        let staging = format!("{path}.partial");
        let script = format!(
            "cat > {staging} && mv -f -- {staging} {target}",
            staging = quote(&staging),
            target = quote(path),
        );
        let result = self.transport.run_with_input(&script, contents)?;
        required("write", path, result).map(|_| ())
    }

    /// Lists entries of `dir` matching `pattern`, sorted by name.
    ///
    /// A missing directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidPattern`] when the pattern contains
    /// characters other than alphanumerics, `_`, `-`, `.`, `*` and `?`.
    pub fn list_glob(&self, dir: &str, pattern: &str) -> Result<Vec<String>, TransportError> {
        if pattern.is_empty()
            || !pattern
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | '*' | '?'))
        {
            return Err(TransportError::InvalidPattern {
                pattern: pattern.to_owned(),
            });
        }

        let script = format!(
            "cd -- {} 2>/dev/null || exit {MISSING_STATUS}; for entry in {pattern}; do [ -e \"$entry\" ] && printf '%s\\n' \"$entry\"; done; true",
            quote(dir)
        );
        let Some(result) = self.run_optional("list", dir, &script)? else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<String> = result
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        entries.sort();
        Ok(entries)
    }

    /// Copies a local UTF-8 file to `remote` on the host.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::LocalFile`] when the local file cannot be
    /// read, or any error from [`FileChannel::write`].
    pub fn upload_file(&self, local: &Utf8Path, remote: &str) -> Result<(), TransportError> {
        let contents = read_local(local)?;
        self.write(remote, &contents)
    }

    fn run_required(
        &self,
        operation: &'static str,
        path: &str,
        script: &str,
    ) -> Result<CommandResult, TransportError> {
        let result = self.transport.run_command(script)?;
        required(operation, path, result)
    }

    fn run_optional(
        &self,
        operation: &'static str,
        path: &str,
        script: &str,
    ) -> Result<Option<CommandResult>, TransportError> {
        let result = self.transport.run_command(script)?;
        match result.exit_code {
            0 => Ok(Some(result)),
            MISSING_STATUS => Ok(None),
            status => Err(TransportError::FileChannel {
                operation,
                path: path.to_owned(),
                status,
                stderr: result.stderr,
            }),
        }
    }
}

fn required(
    operation: &'static str,
    path: &str,
    result: CommandResult,
) -> Result<CommandResult, TransportError> {
    if result.is_success() {
        return Ok(result);
    }
    Err(TransportError::FileChannel {
        operation,
        path: path.to_owned(),
        status: result.exit_code,
        stderr: result.stderr,
    })
}

fn quote(path: &str) -> String {
    escape(path.into()).into_owned()
}

fn read_local(path: &Utf8Path) -> Result<String, TransportError> {
    let local_error = |message: String| TransportError::LocalFile {
        path: path.to_string(),
        message,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| local_error(String::from("path has no file name")))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| local_error(err.to_string()))?;
    dir.read_to_string(file_name)
        .map_err(|err| local_error(err.to_string()))
}
