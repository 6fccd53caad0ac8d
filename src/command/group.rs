//! Group execution in serial and parallel modes.

use tracing::{debug, info};

use crate::status::Status;
use crate::transport::Transport;

use super::{CommandError, Engine, GroupId, GroupMode, Params, TaskGraph};

impl<T: Transport + ?Sized> Engine<'_, T> {
    /// Executes every command of a group and returns the group's status.
    ///
    /// Parallel groups issue all members before joining any. Serial groups
    /// run members in order; once one fails the rest are canceled through
    /// their dependency links. The first failure is returned after every
    /// member has reached a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the first member's [`CommandError`], or a dependency error
    /// when the group's own dependency has not finished.
    pub fn exec_group(
        &self,
        graph: &mut TaskGraph,
        id: GroupId,
        params: &Params,
    ) -> Result<Status, CommandError> {
        let (name, mode, dependency, members) = {
            let group = graph.group(id)?;
            (
                group.name().to_owned(),
                group.mode(),
                group.dependency(),
                group.commands().to_vec(),
            )
        };

        if let Some(node) = dependency {
            match graph.status(node) {
                Status::NotExecuted => {
                    return Err(CommandError::DependencyNotYetRun {
                        command: graph.describe(id.into()),
                        dependency: graph.describe(node),
                    });
                }
                Status::Executing => {
                    return Err(CommandError::DependencyStillRunning {
                        command: graph.describe(id.into()),
                        dependency: graph.describe(node),
                    });
                }
                Status::Failed | Status::Canceled => {
                    debug!(group = %name, "dependency did not complete, canceling group");
                    graph.cancel_group(id)?;
                    graph.update_status(id)?;
                    return Ok(Status::Canceled);
                }
                Status::Done => {}
            }
        }

        info!(group = %name, mode = mode.as_str(), commands = members.len(), "executing group");
        let mut first_error: Option<CommandError> = None;

        match mode {
            GroupMode::Parallel => {
                let mut started = Vec::with_capacity(members.len());
                for member in &members {
                    match self.start(graph, *member, false, params) {
                        Ok(status) if status.is_executing() => started.push(*member),
                        Ok(_) => {}
                        Err(err) => {
                            first_error.get_or_insert(err);
                        }
                    }
                }
                for member in started {
                    if let Err(err) = self.join(graph, member) {
                        first_error.get_or_insert(err);
                    }
                }
            }
            GroupMode::Serial => {
                for member in &members {
                    match self.exec(graph, *member, false, params) {
                        Ok(_) => {}
                        Err(err @ CommandError::CommandFailed { .. }) => {
                            first_error.get_or_insert(err);
                        }
                        Err(err) => {
                            graph.update_status(id)?;
                            return Err(err);
                        }
                    }
                }
            }
        }

        let status = graph.update_status(id)?;
        info!(group = %name, status = %status, "group finished");
        match first_error {
            Some(err) => Err(err),
            None => Ok(status),
        }
    }
}
