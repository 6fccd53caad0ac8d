//! Completion records kept on the remote host.
//!
//! Records live in a hidden directory under the login home, one JSON file
//! per entry named `<key>.<TypeName>`. Commands are keyed by a fingerprint of
//! their resolved text; provisioned components by instance name. Reading and
//! writing goes through the transport's file channel, so a missing record is
//! distinguishable from a broken connection.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::transport::{Transport, TransportError};

mod record;

pub use record::CompletionRecord;

/// Default state directory, relative to the login principal's home.
pub const DEFAULT_STATE_DIR: &str = ".dropship_config";

/// Record type name used for individual commands.
pub const COMMAND_RECORD_TYPE: &str = "Command";

/// Stable content hash of a resolved command.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FingerprintKey(String);

impl FingerprintKey {
    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FingerprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the SHA-256 hex fingerprint of `resolved_text`.
#[must_use]
pub fn fingerprint(resolved_text: &str) -> FingerprintKey {
    let mut hasher = Sha256::new();
    hasher.update(resolved_text.as_bytes());
    FingerprintKey(hex::encode(hasher.finalize()))
}

/// Errors raised while reading or writing completion records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Raised when the file channel fails.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Raised when a record exists but cannot be decoded.
    #[error("malformed record at {path}: {message}")]
    Malformed {
        /// Remote path of the record.
        path: String,
        /// Decoder error.
        message: String,
    },
    /// Raised when a record cannot be encoded.
    #[error("failed to encode record for {path}: {message}")]
    Encode {
        /// Remote path of the record.
        path: String,
        /// Encoder error.
        message: String,
    },
    /// Raised when a type name or key would escape the state directory.
    #[error("invalid record name {name:?}: use letters, digits, '-' and '_'")]
    InvalidName {
        /// Offending type name or key.
        name: String,
    },
}

/// Completion store bound to one transport and state directory.
#[derive(Debug)]
pub struct CompletionStore<'t, T: Transport + ?Sized> {
    transport: &'t T,
    state_dir: String,
}

impl<'t, T: Transport + ?Sized> CompletionStore<'t, T> {
    /// Creates a store rooted at `state_dir` on the host behind `transport`.
    #[must_use]
    pub fn new(transport: &'t T, state_dir: impl Into<String>) -> Self {
        let dir = state_dir.into();
        let trimmed = dir.trim_end_matches('/');
        let state_dir = if trimmed.is_empty() {
            dir
        } else {
            trimmed.to_owned()
        };
        Self {
            transport,
            state_dir,
        }
    }

    /// Returns the state directory.
    #[must_use]
    pub fn state_dir(&self) -> &str {
        &self.state_dir
    }

    /// Returns the remote path of the record for `key` of `component_type`.
    #[must_use]
    pub fn record_path(&self, component_type: &str, key: &str) -> String {
        format!("{}/{key}.{component_type}", self.state_dir)
    }

    /// Loads a record, returning `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] on channel failure and
    /// [`StoreError::Malformed`] when the stored JSON cannot be decoded.
    pub fn load<V: DeserializeOwned>(
        &self,
        component_type: &str,
        key: &str,
    ) -> Result<Option<V>, StoreError> {
        self.load_checked(component_type, key, &[])
    }

    /// Loads a record and discards it unless every `(field, value)` pair in
    /// `expected` matches the stored top-level field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] on channel failure and
    /// [`StoreError::Malformed`] when the stored JSON cannot be decoded.
    pub fn load_checked<V: DeserializeOwned>(
        &self,
        component_type: &str,
        key: &str,
        expected: &[(&str, Value)],
    ) -> Result<Option<V>, StoreError> {
        validate_name(component_type)?;
        validate_name(key)?;
        let path = self.record_path(component_type, key);
        let Some(text) = self.transport.file_channel().read(&path)? else {
            return Ok(None);
        };

        let value: Value = serde_json::from_str(&text).map_err(|err| StoreError::Malformed {
            path: path.clone(),
            message: err.to_string(),
        })?;

        for (field, wanted) in expected {
            if value.get(field) != Some(wanted) {
                debug!(path = %path, field, "ignoring stale record");
                return Ok(None);
            }
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| StoreError::Malformed {
                path,
                message: err.to_string(),
            })
    }

    /// Creates or overwrites a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] when the directory cannot be created
    /// or the write fails.
    pub fn save<V: Serialize + ?Sized>(
        &self,
        component_type: &str,
        key: &str,
        record: &V,
    ) -> Result<(), StoreError> {
        validate_name(component_type)?;
        validate_name(key)?;
        let path = self.record_path(component_type, key);
        let body = serde_json::to_string(record).map_err(|err| StoreError::Encode {
            path: path.clone(),
            message: err.to_string(),
        })?;
        let channel = self.transport.file_channel();
        channel.mkdir(&self.state_dir)?;
        channel.write(&path, &body)?;
        debug!(path = %path, "record saved");
        Ok(())
    }

    /// Lists the keys of all records of `component_type`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] on channel failure.
    pub fn list(&self, component_type: &str) -> Result<Vec<String>, StoreError> {
        validate_name(component_type)?;
        let suffix = format!(".{component_type}");
        let entries = self
            .transport
            .file_channel()
            .list_glob(&self.state_dir, &format!("*{suffix}"))?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| entry.strip_suffix(&suffix).map(str::to_owned))
            .filter(|key| !key.is_empty())
            .collect())
    }
}

/// Checks that `name` is usable as a record key or type name.
///
/// # Errors
///
/// Returns [`StoreError::InvalidName`] for empty names or names containing
/// anything other than ASCII letters, digits, `-` and `_`.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    if !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
    {
        return Ok(());
    }
    Err(StoreError::InvalidName {
        name: name.to_owned(),
    })
}

#[cfg(test)]
mod tests;
