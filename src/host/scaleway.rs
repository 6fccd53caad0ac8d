//! Scaleway host provider driving the `scw` CLI.

use std::ffi::OsString;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::ScalewayConfig;
use crate::transport::{CommandOutput, CommandRunner, ProcessCommandRunner};

use super::{HostError, HostFuture, HostHandle, HostProvider, HostRequest};

/// Default SSH port probed during readiness checks.
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct ScwIp {
    address: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct ScwServer {
    id: String,
    name: String,
    zone: String,
    state: String,
    #[serde(default)]
    public_ip: Option<ScwIp>,
    #[serde(default)]
    public_ips: Vec<ScwIp>,
}

impl From<ScwServer> for HostHandle {
    fn from(server: ScwServer) -> Self {
        let public_ip = server
            .public_ip
            .iter()
            .chain(server.public_ips.iter())
            .find_map(|ip| IpAddr::from_str(&ip.address).ok());
        Self {
            id: server.id,
            name: server.name,
            zone: server.zone,
            state: server.state,
            public_ip,
        }
    }
}

/// Finds and creates hosts by shelling out to `scw`.
#[derive(Clone, Debug)]
pub struct ScalewayHosts<R: CommandRunner = ProcessCommandRunner> {
    scw_bin: String,
    project_id: String,
    zone: String,
    pub(super) wait_timeout: Duration,
    pub(super) poll_interval: Duration,
    pub(super) ssh_port: u16,
    runner: R,
}

impl ScalewayHosts<ProcessCommandRunner> {
    /// Creates a provider that runs the real `scw` binary.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidConfig`] when the binary or project is
    /// not configured.
    pub fn with_process_runner(config: &ScalewayConfig) -> Result<Self, HostError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> ScalewayHosts<R> {
    /// Creates a provider using `runner` to execute `scw`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidConfig`] when the binary or project is
    /// not configured.
    pub fn new(config: &ScalewayConfig, runner: R) -> Result<Self, HostError> {
        let scw_bin = config.scw_bin.trim().to_owned();
        if scw_bin.is_empty() {
            return Err(HostError::InvalidConfig {
                field: String::from("scw_bin"),
            });
        }
        let project_id = config
            .default_project_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| HostError::InvalidConfig {
                field: String::from("default_project_id"),
            })?
            .to_owned();
        Ok(Self {
            scw_bin,
            project_id,
            zone: config.default_zone.trim().to_owned(),
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            ssh_port: DEFAULT_SSH_PORT,
            runner,
        })
    }

    /// Overrides the readiness timeout and poll interval.
    #[must_use]
    pub const fn with_timing(mut self, wait_timeout: Duration, poll_interval: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// Overrides the port probed for SSH readiness.
    #[must_use]
    pub const fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// Returns the runner used to execute `scw`.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    pub(super) fn list_servers(&self, zone: &str) -> Result<Vec<HostHandle>, HostError> {
        let args = vec![
            OsString::from("instance"),
            OsString::from("server"),
            OsString::from("list"),
            OsString::from(format!("zone={zone}")),
            OsString::from(format!("project-id={}", self.project_id)),
            OsString::from("-o"),
            OsString::from("json"),
        ];
        let servers: Vec<ScwServer> = self.run_scw_json(&args, "servers")?;
        Ok(servers.into_iter().map(HostHandle::from).collect())
    }

    fn create_server(&self, request: &HostRequest) -> Result<HostHandle, HostError> {
        request.validate()?;
        if let Some(existing) = self
            .list_servers(&request.region)?
            .into_iter()
            .find(|server| server.name == request.name)
        {
            return Err(HostError::HostExists {
                name: existing.name,
                id: existing.id,
            });
        }

        let args = vec![
            OsString::from("instance"),
            OsString::from("server"),
            OsString::from("create"),
            OsString::from(format!("type={}", request.size)),
            OsString::from(format!("zone={}", request.region)),
            OsString::from(format!("image={}", request.image)),
            OsString::from(format!("name={}", request.name)),
            OsString::from("ip=new"),
            OsString::from(format!("project-id={}", self.project_id)),
            OsString::from("-o"),
            OsString::from("json"),
        ];
        let server: ScwServer = self.run_scw_json(&args, "server create")?;
        info!(id = %server.id, name = %server.name, "host created");
        Ok(server.into())
    }

    fn run_scw_json<T: DeserializeOwned>(
        &self,
        args: &[OsString],
        resource: &str,
    ) -> Result<T, HostError> {
        debug!(resource, "running scw");
        let output = self.runner.run(&self.scw_bin, args)?;
        let output = self.check_scw_output(output, resource)?;
        serde_json::from_str(&output.stdout).map_err(|err| HostError::Parse {
            resource: resource.to_owned(),
            message: err.to_string(),
        })
    }

    fn check_scw_output(
        &self,
        output: CommandOutput,
        resource: &str,
    ) -> Result<CommandOutput, HostError> {
        if output.is_success() {
            return Ok(output);
        }
        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(HostError::CommandFailure {
            program: self.scw_bin.clone(),
            status_text,
            stderr: format!("{resource}: {}", output.stderr.trim()),
        })
    }
}

impl<R: CommandRunner> HostProvider for ScalewayHosts<R> {
    fn list(&self) -> HostFuture<'_, Vec<HostHandle>> {
        Box::pin(async move { self.list_servers(&self.zone) })
    }

    fn create<'a>(&'a self, request: &'a HostRequest) -> HostFuture<'a, HostHandle> {
        Box::pin(async move { self.create_server(request) })
    }

    fn wait_for_ready<'a>(&'a self, handle: &'a HostHandle) -> HostFuture<'a, HostHandle> {
        Box::pin(async move {
            let ready = self.wait_for_public_ip(handle).await?;
            self.wait_for_ssh(&ready).await?;
            Ok(ready)
        })
    }
}
