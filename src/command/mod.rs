//! Command execution engine.
//!
//! A [`TaskGraph`] owns commands and groups; an [`Engine`] drives them over
//! a [`Transport`], consulting the [`CompletionStore`] so that a command that
//! already succeeded on the host is never run again.
//!
//! Dependency handling follows one rule for commands and groups alike:
//!
//! - dependency not executed yet: [`CommandError::DependencyNotYetRun`];
//! - dependency still in flight: [`CommandError::DependencyStillRunning`];
//! - dependency failed or canceled: the node becomes
//!   [`Status::Canceled`] without issuing anything and without an error;
//! - no dependency, or dependency done: the node runs.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::status::Status;
use crate::store::{COMMAND_RECORD_TYPE, CompletionRecord, CompletionStore, fingerprint};
use crate::transport::Transport;

mod error;
mod graph;
mod group;
mod template;

pub use error::CommandError;
pub use graph::{Command, CommandGroup, CommandId, GroupId, GroupMode, NodeId, TaskGraph};
pub use template::{Params, TemplateError, escape_braces, resolve};

/// Drives a [`TaskGraph`] over one transport and completion store.
#[derive(Debug)]
pub struct Engine<'t, T: Transport + ?Sized> {
    transport: &'t T,
    store: CompletionStore<'t, T>,
}

impl<'t, T: Transport + ?Sized> Engine<'t, T> {
    /// Creates an engine whose completion records live in `state_dir`.
    #[must_use]
    pub fn new(transport: &'t T, state_dir: impl Into<String>) -> Self {
        Self {
            transport,
            store: CompletionStore::new(transport, state_dir),
        }
    }

    /// Transport the engine issues commands on.
    #[must_use]
    pub const fn transport(&self) -> &'t T {
        self.transport
    }

    /// Completion store backing the engine.
    #[must_use]
    pub const fn store(&self) -> &CompletionStore<'t, T> {
        &self.store
    }

    /// Executes a command to a terminal state.
    ///
    /// Returns the resulting status, which is `Done` or `Canceled` on
    /// success. With `force` the completion store is bypassed and the command
    /// runs even if a record exists.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::CommandFailed`] on a non-zero exit, the
    /// dependency errors described in the module docs, and template, store or
    /// transport failures.
    pub fn exec(
        &self,
        graph: &mut TaskGraph,
        id: CommandId,
        force: bool,
        params: &Params,
    ) -> Result<Status, CommandError> {
        let status = self.start(graph, id, force, params)?;
        if status.is_executing() {
            return self.join(graph, id);
        }
        Ok(status)
    }

    /// Resolves and issues a command without waiting for it.
    ///
    /// Returns `Executing` when the command was issued, or a terminal status
    /// when it was skipped (`Done`) or canceled. Call [`Engine::join`] to
    /// collect an issued command.
    ///
    /// # Errors
    ///
    /// See [`Engine::exec`].
    pub fn start(
        &self,
        graph: &mut TaskGraph,
        id: CommandId,
        force: bool,
        params: &Params,
    ) -> Result<Status, CommandError> {
        let (template, dependency) = {
            let command = graph.command(id)?;
            (command.template().to_owned(), command.dependency())
        };

        if let Some(node) = dependency {
            match graph.status(node) {
                Status::NotExecuted => {
                    return Err(CommandError::DependencyNotYetRun {
                        command: template,
                        dependency: graph.describe(node),
                    });
                }
                Status::Executing => {
                    return Err(CommandError::DependencyStillRunning {
                        command: template,
                        dependency: graph.describe(node),
                    });
                }
                Status::Failed | Status::Canceled => {
                    debug!(command = %template, "dependency did not complete, canceling");
                    graph.command_mut(id)?.status = Status::Canceled;
                    return Ok(Status::Canceled);
                }
                Status::Done => {}
            }
        }

        let resolved = resolve(&template, params)?;
        let command = graph.command_mut(id)?;
        command.bind(resolved.clone())?;

        if command.status.is_executing() {
            return Ok(Status::Executing);
        }
        if command.status.is_done() && !force {
            return Ok(Status::Done);
        }

        let key = fingerprint(&resolved);
        if !force
            && let Some(record) = self.store.load_checked::<CompletionRecord>(
                COMMAND_RECORD_TYPE,
                key.as_str(),
                &[("resolved_text", Value::String(resolved.clone()))],
            )?
            && record.status.is_done()
        {
            info!(command = %resolved, "already completed, skipping");
            command.skip_with(record);
            return Ok(Status::Done);
        }

        info!(command = %resolved, "running");
        let pending = self.transport.start(&resolved)?;
        command.status = Status::Executing;
        command.pending = Some(pending);
        Ok(Status::Executing)
    }

    /// Waits for an issued command and records its outcome.
    ///
    /// A command that is not in flight is left untouched and its current
    /// status is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::CommandFailed`] on a non-zero exit,
    /// [`CommandError::Transport`] when the channel fails, and
    /// [`CommandError::Store`] when the record cannot be written. In each
    /// case the command is left `Failed`, so only recorded commands are
    /// `Done`.
    pub fn join(&self, graph: &mut TaskGraph, id: CommandId) -> Result<Status, CommandError> {
        let command = graph.command_mut(id)?;
        let Some(pending) = command.pending.take() else {
            return Ok(command.status);
        };

        let result = match pending.wait() {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "transport failed while waiting for command");
                command.fail_with(err.to_string());
                return Err(err.into());
            }
        };
        command.finish(result);

        let resolved = command.resolved_text().unwrap_or_default().to_owned();
        if command.status.is_done() {
            if let Some(record) = command.record()
                && let Err(err) =
                    self.store
                        .save(COMMAND_RECORD_TYPE, fingerprint(&resolved).as_str(), &record)
            {
                warn!(command = %resolved, error = %err, "completion record not saved");
                command.status = Status::Failed;
                return Err(err.into());
            }
            info!(command = %resolved, "completed");
            return Ok(Status::Done);
        }

        warn!(command = %resolved, exit_code = ?command.exit_code(), "command failed");
        Err(CommandError::CommandFailed {
            command: resolved,
            exit_code: command.exit_code().unwrap_or(-1),
            stdout: command.stdout().to_owned(),
            stderr: command.stderr().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests;
