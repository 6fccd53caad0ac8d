//! SSH transport configuration and validation.
//!
//! [`TransportConfig`] is loaded via `ortho-config`, which merges defaults,
//! configuration files and `DROPSHIP_*` environment variables.

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::TransportError;

/// Default multiplexing socket path. `%C` is expanded by `ssh` to a hash of
/// the connection parameters.
pub const DEFAULT_CONTROL_PATH: &str = "~/.ssh/dropship-%C";

/// SSH settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, Serialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "DROPSHIP",
    discovery(
        app_name = "dropship",
        env_var = "DROPSHIP_CONFIG_PATH",
        config_file_name = "dropship.toml",
        dotfile_name = ".dropship.toml",
        project_file_name = "dropship.toml"
    )
)]
pub struct TransportConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Remote login principal.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Remote SSH port.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; freshly created hosts have
    /// unknown keys, so it defaults to off.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Path to the SSH private key. Supports `~/` expansion. When absent SSH
    /// falls back to its default key locations.
    pub ssh_identity_file: Option<String>,
    /// Socket path for the multiplexing master. An empty value disables
    /// multiplexing, in which case every command opens its own connection.
    #[ortho_config(default = DEFAULT_CONTROL_PATH.to_owned())]
    pub ssh_control_path: String,
    /// Seconds the multiplexing master stays up after the last channel closes.
    #[ortho_config(default = 300)]
    pub ssh_control_persist_secs: u32,
}

/// Errors raised when loading the transport configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum TransportConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("ssh configuration parsing failed: {0}")]
    Parse(String),
}

impl TransportConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] when a required field is
    /// empty.
    pub fn validate(&self) -> Result<(), TransportError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        Self::require_optional_value(self.ssh_identity_file.as_deref(), "ssh_identity_file")?;
        if self.ssh_port == 0 {
            return Err(TransportError::InvalidConfig {
                field: String::from("ssh_port"),
            });
        }
        Ok(())
    }

    /// Loads configuration from defaults, configuration files and environment
    /// variables without parsing process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`TransportConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, TransportConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("dropship")])
            .map_err(|err| TransportConfigLoadError::Parse(err.to_string()))
    }

    /// Returns `true` when connection multiplexing is configured.
    #[must_use]
    pub fn multiplexing_enabled(&self) -> bool {
        !self.ssh_control_path.trim().is_empty()
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), TransportError> {
        match value {
            None => Ok(()),
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(TransportError::InvalidConfig {
                field: field.to_owned(),
            }),
        }
    }

    fn require_value(value: &str, field: &str) -> Result<(), TransportError> {
        Self::require_optional_value(Some(value), field)
    }
}
