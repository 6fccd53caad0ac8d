//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::HostRequest;
use crate::store::DEFAULT_STATE_DIR;

/// Scaleway settings used to find or create the target host, derived from
/// environment variables and configuration files.
#[derive(Clone, Debug, Deserialize, Serialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SCW",
    discovery(
        app_name = "dropship",
        env_var = "DROPSHIP_CONFIG_PATH",
        config_file_name = "dropship.toml",
        dotfile_name = ".dropship.toml",
        project_file_name = "dropship.toml"
    )
)]
pub struct ScalewayConfig {
    /// Path to the `scw` CLI binary. The CLI reads its own credentials.
    #[ortho_config(default = "scw".to_owned())]
    pub scw_bin: String,
    /// Project identifier used for billing and resource scoping.
    pub default_project_id: Option<String>,
    /// Preferred availability zone. Defaults to `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
    /// Commercial type for new instances.
    #[ortho_config(default = "DEV1-S".to_owned())]
    pub default_instance_type: String,
    /// Image label or identifier for new instances.
    #[ortho_config(default = "ubuntu_jammy".to_owned())]
    pub default_image: String,
    /// Seconds to wait for a new instance to accept SSH connections.
    #[ortho_config(default = 300)]
    pub wait_timeout_secs: u64,
    /// Seconds between readiness polls.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
}

/// Settings for a provisioning run, from `DROPSHIP_*` variables and
/// `dropship.toml`.
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
pub struct ProvisionConfig {
    /// Directory on the host holding completion records, relative to the
    /// login home.
    #[ortho_config(default = DEFAULT_STATE_DIR.to_owned())]
    pub state_dir: String,
    /// Name of the host to select or create.
    #[ortho_config(default = "dropship".to_owned())]
    pub host_name: String,
    /// Address of an existing host; skips the cloud provider entirely.
    pub host_address: Option<String>,
    /// Name of the web application; also names its service and site.
    #[ortho_config(default = "webapp".to_owned())]
    pub app_name: String,
    /// Unix account the application runs as.
    #[ortho_config(default = "app".to_owned())]
    pub app_user: String,
    /// Public domain name of the application.
    pub domain: Option<String>,
    /// Repository as `owner/repo` or a clone URL.
    pub github_repo: Option<String>,
    /// Branch to deploy.
    #[ortho_config(default = "main".to_owned())]
    pub github_branch: String,
    /// Access token for private repositories.
    pub github_token: Option<String>,
    /// gunicorn entry point, e.g. `shop.wsgi:application`.
    pub wsgi_module: Option<String>,
    /// Local `.env` whose values override the generated defaults.
    pub env_file: Option<String>,
    /// Database name.
    #[ortho_config(default = "db".to_owned())]
    pub database_name: String,
    /// Database owner role.
    #[ortho_config(default = "dbuser".to_owned())]
    pub database_user: String,
    /// Database role password; generated when absent.
    pub database_password: Option<String>,
    /// Whether to enable WAL archiving and take a base backup.
    #[ortho_config(default = true)]
    pub database_backup: bool,
    /// Extra jobs run in the project directory after deployment.
    pub post_deploy: Vec<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

fn require_field(value: Option<&str>, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to dropship.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        ))),
    }
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("dropship")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds a [`HostRequest`] for `name` using the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn as_request(&self, name: &str) -> Result<HostRequest, ConfigError> {
        self.validate()?;
        Ok(HostRequest {
            name: name.trim().to_owned(),
            image: self.default_image.trim().to_owned(),
            region: self.default_zone.trim().to_owned(),
            size: self.default_instance_type.trim().to_owned(),
        })
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            Some(&self.scw_bin),
            &FieldMetadata::new("scw binary", "SCW_SCW_BIN", "scw_bin"),
        )?;
        require_field(
            self.default_project_id.as_deref(),
            &FieldMetadata::new(
                "Scaleway project ID",
                "SCW_DEFAULT_PROJECT_ID",
                "default_project_id",
            ),
        )?;
        require_field(
            Some(&self.default_image),
            &FieldMetadata::new("VM image", "SCW_DEFAULT_IMAGE", "default_image"),
        )?;
        require_field(
            Some(&self.default_instance_type),
            &FieldMetadata::new(
                "instance type",
                "SCW_DEFAULT_INSTANCE_TYPE",
                "default_instance_type",
            ),
        )?;
        require_field(
            Some(&self.default_zone),
            &FieldMetadata::new("availability zone", "SCW_DEFAULT_ZONE", "default_zone"),
        )?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "poll interval must be at least one second: set SCW_POLL_INTERVAL_SECS",
            )));
        }
        Ok(())
    }
}

impl ProvisionConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("dropship")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks the fields a full provisioning run needs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the variable or TOML key
    /// to set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            Some(&self.state_dir),
            &FieldMetadata::new("state directory", "DROPSHIP_STATE_DIR", "state_dir"),
        )?;
        require_field(
            Some(&self.app_name),
            &FieldMetadata::new("application name", "DROPSHIP_APP_NAME", "app_name"),
        )?;
        require_field(
            Some(&self.app_user),
            &FieldMetadata::new("application user", "DROPSHIP_APP_USER", "app_user"),
        )?;
        require_field(
            self.github_repo.as_deref(),
            &FieldMetadata::new("source repository", "DROPSHIP_GITHUB_REPO", "github_repo"),
        )?;
        require_field(
            Some(&self.database_name),
            &FieldMetadata::new("database name", "DROPSHIP_DATABASE_NAME", "database_name"),
        )?;
        require_field(
            Some(&self.database_user),
            &FieldMetadata::new("database user", "DROPSHIP_DATABASE_USER", "database_user"),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn scaleway() -> ScalewayConfig {
        ScalewayConfig {
            scw_bin: String::from("scw"),
            default_project_id: Some(String::from("proj")),
            default_zone: String::from("fr-par-1"),
            default_instance_type: String::from("DEV1-S"),
            default_image: String::from("ubuntu_jammy"),
            wait_timeout_secs: 300,
            poll_interval_secs: 5,
        }
    }

    #[fixture]
    fn provision() -> ProvisionConfig {
        ProvisionConfig {
            state_dir: String::from(DEFAULT_STATE_DIR),
            host_name: String::from("dropship"),
            host_address: None,
            app_name: String::from("webapp"),
            app_user: String::from("app"),
            domain: None,
            github_repo: Some(String::from("acme/shop")),
            github_branch: String::from("main"),
            github_token: None,
            wsgi_module: None,
            env_file: None,
            database_name: String::from("db"),
            database_user: String::from("dbuser"),
            database_password: None,
            database_backup: true,
            post_deploy: Vec::new(),
        }
    }

    #[rstest]
    fn request_uses_trimmed_defaults(scaleway: ScalewayConfig) {
        let request = scaleway.as_request(" web-1 ").expect("request");

        assert_eq!(
            request,
            HostRequest {
                name: String::from("web-1"),
                image: String::from("ubuntu_jammy"),
                region: String::from("fr-par-1"),
                size: String::from("DEV1-S"),
            }
        );
    }

    #[rstest]
    fn missing_project_names_env_var(scaleway: ScalewayConfig) {
        let config = ScalewayConfig {
            default_project_id: None,
            ..scaleway
        };

        let err = config.validate().expect_err("project required");

        assert_eq!(
            err,
            ConfigError::MissingField(String::from(
                "missing Scaleway project ID: set SCW_DEFAULT_PROJECT_ID or add default_project_id to dropship.toml"
            ))
        );
    }

    #[rstest]
    fn zero_poll_interval_is_invalid(scaleway: ScalewayConfig) {
        let config = ScalewayConfig {
            poll_interval_secs: 0,
            ..scaleway
        };

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    fn provision_config_requires_repository(provision: ProvisionConfig) {
        assert!(provision.validate().is_ok());
        let config = ProvisionConfig {
            github_repo: Some(String::from("  ")),
            ..provision
        };

        let err = config.validate().expect_err("repo required");

        assert!(err.to_string().contains("DROPSHIP_GITHUB_REPO"), "{err}");
    }
}
