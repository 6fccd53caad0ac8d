//! Readiness polling for newly created hosts.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::transport::CommandRunner;

use super::{HostError, HostHandle, ScalewayHosts};

const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

impl<R: CommandRunner> ScalewayHosts<R> {
    pub(super) async fn wait_for_public_ip(
        &self,
        handle: &HostHandle,
    ) -> Result<HostHandle, HostError> {
        let deadline = Instant::now() + self.wait_timeout;
        let mut saw_running = false;

        while Instant::now() <= deadline {
            let Some(server) = self
                .list_servers(&handle.zone)?
                .into_iter()
                .find(|server| server.id == handle.id)
            else {
                return Err(HostError::HostNotFound {
                    id: handle.id.clone(),
                });
            };

            if server.is_running() {
                saw_running = true;
                if server.public_ip.is_some() {
                    return Ok(server);
                }
            }

            debug!(id = %handle.id, state = %server.state, "host not ready yet");
            sleep(self.poll_interval).await;
        }

        if saw_running {
            return Err(HostError::MissingPublicIp {
                id: handle.id.clone(),
            });
        }

        Err(HostError::Timeout {
            action: String::from("wait_for_ready"),
            id: handle.id.clone(),
        })
    }

    pub(super) async fn wait_for_ssh(&self, handle: &HostHandle) -> Result<(), HostError> {
        let Some(address) = handle.public_ip else {
            return Err(HostError::MissingPublicIp {
                id: handle.id.clone(),
            });
        };
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            let connect = timeout(SSH_CONNECT_TIMEOUT, TcpStream::connect((address, self.ssh_port))).await;
            if matches!(connect, Ok(Ok(_))) {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }

        Err(HostError::Timeout {
            action: String::from("wait_for_ssh_ready"),
            id: handle.id.clone(),
        })
    }
}
