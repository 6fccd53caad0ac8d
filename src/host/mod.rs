//! Host provider abstraction for finding or creating the target machine.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

use crate::transport::TransportError;

mod scaleway;
mod wait;

pub use scaleway::ScalewayHosts;

/// Parameters for a new host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostRequest {
    /// Host name; must be unique within the project.
    pub name: String,
    /// Image label or identifier.
    pub image: String,
    /// Zone or region to create the host in.
    pub region: String,
    /// Commercial type or size.
    pub size: String,
}

impl HostRequest {
    /// Validates the request, returning the first empty field.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidConfig`] when any field is empty.
    pub fn validate(&self) -> Result<(), HostError> {
        for (field, value) in [
            ("name", &self.name),
            ("image", &self.image),
            ("region", &self.region),
            ("size", &self.size),
        ] {
            if value.trim().is_empty() {
                return Err(HostError::InvalidConfig {
                    field: field.to_owned(),
                });
            }
        }
        Ok(())
    }
}

/// A host known to the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostHandle {
    /// Provider identifier.
    pub id: String,
    /// Host name.
    pub name: String,
    /// Zone the host lives in.
    pub zone: String,
    /// Provider state, e.g. `running`.
    pub state: String,
    /// Public address, once assigned.
    pub public_ip: Option<IpAddr>,
}

impl HostHandle {
    /// Returns `true` when the provider reports the host as running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Errors raised by host providers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HostError {
    /// A host with the requested name already exists.
    #[error("a host named {name} already exists ({id}); select it instead")]
    HostExists {
        /// Host name.
        name: String,
        /// Identifier of the existing host.
        id: String,
    },
    /// The host disappeared while waiting for it.
    #[error("host {id} no longer exists")]
    HostNotFound {
        /// Host identifier.
        id: String,
    },
    /// The provider CLI exited non-zero.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed (typically `scw`).
        program: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Provider output could not be parsed.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// Resource being parsed (for example `servers`).
        resource: String,
        /// Parser error message.
        message: String,
    },
    /// The host did not become ready in time.
    #[error("timed out waiting for {action} on host {id}")]
    Timeout {
        /// Phase that timed out.
        action: String,
        /// Host identifier.
        id: String,
    },
    /// The host is running but has no public address.
    #[error("host {id} is running but has no public IP address")]
    MissingPublicIp {
        /// Host identifier.
        id: String,
    },
    /// The provider CLI could not be started.
    #[error(transparent)]
    Spawn(#[from] TransportError),
    /// A required request or configuration value is empty.
    #[error("missing {field}")]
    InvalidConfig {
        /// Name of the missing field.
        field: String,
    },
}

/// Future returned by host provider operations.
pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, HostError>> + 'a>>;

/// Interface to a source of hosts.
pub trait HostProvider {
    /// Lists existing hosts.
    fn list(&self) -> HostFuture<'_, Vec<HostHandle>>;

    /// Creates a host, failing with [`HostError::HostExists`] when the name
    /// is taken.
    fn create<'a>(&'a self, request: &'a HostRequest) -> HostFuture<'a, HostHandle>;

    /// Waits until the host runs, has a public address and accepts SSH.
    fn wait_for_ready<'a>(&'a self, handle: &'a HostHandle) -> HostFuture<'a, HostHandle>;
}
