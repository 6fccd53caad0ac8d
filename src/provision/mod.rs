//! End-to-end provisioning of one host.
//!
//! [`provision`] locates the host (a configured address, or a Scaleway
//! instance found or created by name), opens the SSH session and sets up the
//! database, the cache and the web application in that order. Each step goes
//! through [`setup_or_select`], so rerunning a pass reuses recorded
//! components and skips commands that already succeeded.

use camino::Utf8Path;
use thiserror::Error;
use tracing::info;

use crate::command::Engine;
use crate::component::{
    ComponentError, Database, DatabaseUser, PresetSelector, RedisCache, WebApp, WebAppOptions,
    setup_or_select,
};
use crate::config::{ConfigError, ProvisionConfig, ScalewayConfig};
use crate::env_file::{EnvFile, EnvFileError};
use crate::host::{HostError, HostHandle, HostProvider, HostRequest, ScalewayHosts};
use crate::repo::RepoSource;
use crate::transport::{SshTransport, Transport, TransportConfig, TransportError};

/// Errors raised by a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Configuration was missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The host could not be found, created or reached.
    #[error(transparent)]
    Host(#[from] HostError),
    /// The SSH session failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The local `.env` file could not be read.
    #[error(transparent)]
    EnvFile(#[from] EnvFileError),
    /// Selecting or setting up a component failed.
    #[error(transparent)]
    Component(#[from] ComponentError),
}

/// What a completed run set up.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionReport {
    /// Address the session connected to.
    pub address: String,
    /// Connection URL of the database.
    pub database_url: String,
    /// Connection URL of the cache.
    pub cache_url: String,
    /// Public URL of the web application.
    pub app_url: String,
}

/// Provisions the configured host end to end.
///
/// # Errors
///
/// Returns [`ProvisionError`] for the first step that fails. A failed setup
/// command surfaces as [`ComponentError::Command`] with the command's output.
pub async fn provision(
    config: &ProvisionConfig,
    transport_config: TransportConfig,
) -> Result<ProvisionReport, ProvisionError> {
    config.validate()?;
    let address = match configured_address(config) {
        Some(address) => address.to_owned(),
        None => {
            let scaleway = ScalewayConfig::load_without_cli_args()?;
            let request = scaleway.as_request(&config.host_name)?;
            let hosts = ScalewayHosts::with_process_runner(&scaleway)?;
            let handle = resolve_host(&hosts, &request).await?;
            public_address(&handle)?
        }
    };

    let transport = SshTransport::connect_with_process_runner(transport_config, address.clone())?;
    let result = provision_host(&transport, config, &address);
    transport.close();
    result
}

/// Returns the configured host address, ignoring blank values.
#[must_use]
pub fn configured_address(config: &ProvisionConfig) -> Option<&str> {
    config
        .host_address
        .as_deref()
        .map(str::trim)
        .filter(|address| !address.is_empty())
}

/// Finds the host named in `request` or creates it, then waits until it is
/// reachable.
///
/// # Errors
///
/// Returns [`HostError`] when listing, creating or waiting fails.
pub async fn resolve_host<P: HostProvider + ?Sized>(
    provider: &P,
    request: &HostRequest,
) -> Result<HostHandle, HostError> {
    let existing = provider
        .list()
        .await?
        .into_iter()
        .find(|host| host.name == request.name);
    let handle = if let Some(host) = existing {
        info!(name = %host.name, id = %host.id, "using existing host");
        host
    } else {
        info!(name = %request.name, zone = %request.region, "creating host");
        provider.create(request).await?
    };
    provider.wait_for_ready(&handle).await
}

fn public_address(handle: &HostHandle) -> Result<String, HostError> {
    handle
        .public_ip
        .map(|ip| ip.to_string())
        .ok_or_else(|| HostError::MissingPublicIp {
            id: handle.id.clone(),
        })
}

/// Sets up the database, cache and web application over an open session.
///
/// # Errors
///
/// Returns [`ProvisionError`] when the configuration is invalid, the `.env`
/// file cannot be read or a component fails.
pub fn provision_host<T: Transport + ?Sized>(
    transport: &T,
    config: &ProvisionConfig,
    address: &str,
) -> Result<ProvisionReport, ProvisionError> {
    config.validate()?;
    let engine = Engine::new(transport, config.state_dir.clone());

    let database: Database =
        setup_or_select(&engine, &PresetSelector::named(&config.database_name), || {
            Database::new(
                config.database_name.clone(),
                DatabaseUser::new(config.database_user.clone(), config.database_password.clone()),
                config.database_backup,
            )
        })?;
    let cache: RedisCache =
        setup_or_select(&engine, &PresetSelector::only_existing(), RedisCache::default)?;

    let env = match config.env_file.as_deref() {
        Some(path) => EnvFile::load(Utf8Path::new(path))?,
        None => EnvFile::new(),
    };
    let options = WebAppOptions {
        name: config.app_name.clone(),
        domain: config.domain.clone().unwrap_or_default(),
        address: address.to_owned(),
        user: config.app_user.clone(),
        password: None,
        repo: RepoSource::new(
            config.github_repo.clone().unwrap_or_default(),
            config.github_branch.clone(),
        )
        .with_token(config.github_token.clone()),
        wsgi_module: config.wsgi_module.clone(),
        database: database.clone(),
        cache: cache.clone(),
        env,
        post_deploy: config.post_deploy.clone(),
    };
    let app: WebApp = setup_or_select(&engine, &PresetSelector::named(&config.app_name), || {
        WebApp::new(options)
    })?;

    info!(address, app = %config.app_name, "provisioning finished");
    Ok(ProvisionReport {
        address: address.to_owned(),
        database_url: database.url(),
        cache_url: cache.url(),
        app_url: app.url(),
    })
}
