//! Environment file for the deployed application.

use std::collections::BTreeMap;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a local `.env` file.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum EnvFileError {
    /// Raised when the file cannot be opened or read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Path that could not be read.
        path: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Ordered `KEY=VALUE` mapping rendered into the application's `.env`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EnvFile(BTreeMap<String, String>);

impl EnvFile {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables every deployment starts from.
    #[must_use]
    pub fn with_defaults(
        cache_url: &str,
        database_url: &str,
        domain: &str,
        address: &str,
    ) -> Self {
        let mut env = Self::new();
        env.set("DEBUG", "False");
        env.set("DEVMODE", "False");
        env.set("CACHE_URL", cache_url);
        env.set("DATABASE_URL", database_url);
        env.set("ALLOWED_HOSTS", format!("{domain},{address}"));
        env
    }

    /// Parses `.env` text. Blank lines, comments and lines without `=` are
    /// ignored; matching surrounding quotes are stripped from values.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut env = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            env.set(key, strip_quotes(value.trim()));
        }
        env
    }

    /// Reads and parses a local file.
    ///
    /// # Errors
    ///
    /// Returns [`EnvFileError::Io`] when the file cannot be read.
    pub fn load(path: &Utf8Path) -> Result<Self, EnvFileError> {
        let io_error = |message: String| EnvFileError::Io {
            path: path.to_string(),
            message,
        };
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| io_error(String::from("path has no file name")))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| io_error(err.to_string()))?;
        let text = dir
            .read_to_string(file_name)
            .map_err(|err| io_error(err.to_string()))?;
        Ok(Self::parse(&text))
    }

    /// Sets a variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Overlays every variable of `other`.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders `KEY=VALUE` lines in key order.
    #[must_use]
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect()
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2
            && let Some(inner) = value
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
