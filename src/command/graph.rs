//! Arena of commands and command groups linked by dependency edges.
//!
//! Nodes are only ever appended and a dependency must name a node that
//! already exists, so the graph is acyclic by construction.

use std::fmt;

use crate::status::Status;
use crate::store::{CompletionRecord, FingerprintKey, fingerprint};
use crate::transport::{CommandResult, PendingCommand};

use super::CommandError;

/// Index of a command inside a [`TaskGraph`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CommandId(usize);

/// Index of a command group inside a [`TaskGraph`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GroupId(usize);

/// Either kind of node; used for dependency edges.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeId {
    /// A single command.
    Command(CommandId),
    /// A command group.
    Group(GroupId),
}

impl From<CommandId> for NodeId {
    fn from(value: CommandId) -> Self {
        Self::Command(value)
    }
}

impl From<GroupId> for NodeId {
    fn from(value: GroupId) -> Self {
        Self::Group(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(CommandId(index)) => write!(f, "command #{index}"),
            Self::Group(GroupId(index)) => write!(f, "group #{index}"),
        }
    }
}

/// How the commands of a group are driven.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupMode {
    /// One after another; each command depends on its predecessor.
    Serial,
    /// All issued before any is joined; no intra-group dependencies.
    Parallel,
}

impl GroupMode {
    /// Lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Parallel => "parallel",
        }
    }
}

/// A single shell command template and its execution state.
#[derive(Debug)]
pub struct Command {
    template: String,
    dependency: Option<NodeId>,
    resolved_text: Option<String>,
    pub(super) status: Status,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    pub(super) pending: Option<PendingCommand>,
}

impl Command {
    fn new(template: String, dependency: Option<NodeId>) -> Self {
        Self {
            template,
            dependency,
            resolved_text: None,
            status: Status::NotExecuted,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            pending: None,
        }
    }

    /// Template with unresolved placeholders.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Node this command waits for, if any.
    #[must_use]
    pub const fn dependency(&self) -> Option<NodeId> {
        self.dependency
    }

    /// Resolved text, once the command has been executed.
    #[must_use]
    pub fn resolved_text(&self) -> Option<&str> {
        self.resolved_text.as_deref()
    }

    /// Fingerprint of the resolved text, once resolved.
    #[must_use]
    pub fn fingerprint(&self) -> Option<FingerprintKey> {
        self.resolved_text.as_deref().map(fingerprint)
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Exit code of the run, if one finished or was loaded from a record.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Captured standard output.
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured standard error.
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Binds the resolved text. A command keeps its first resolution; a
    /// different text means the caller needs a new command.
    pub(super) fn bind(&mut self, resolved: String) -> Result<(), CommandError> {
        match self.resolved_text.as_deref() {
            None => {
                self.resolved_text = Some(resolved);
                Ok(())
            }
            Some(bound) if bound == resolved => Ok(()),
            Some(bound) => Err(CommandError::ResolvedTextChanged {
                bound: bound.to_owned(),
                requested: resolved,
            }),
        }
    }

    pub(super) fn skip_with(&mut self, record: CompletionRecord) {
        self.status = Status::Done;
        self.exit_code = Some(record.exit_code);
        self.stdout = record.stdout;
        self.stderr = record.stderr;
    }

    pub(super) fn finish(&mut self, result: CommandResult) {
        self.status = if result.is_success() {
            Status::Done
        } else {
            Status::Failed
        };
        self.exit_code = Some(result.exit_code);
        self.stdout = result.stdout;
        self.stderr = result.stderr;
    }

    pub(super) fn fail_with(&mut self, message: String) {
        self.status = Status::Failed;
        self.exit_code = None;
        self.stderr = message;
    }

    pub(super) fn record(&self) -> Option<CompletionRecord> {
        Some(CompletionRecord {
            resolved_text: self.resolved_text.clone()?,
            status: self.status,
            exit_code: self.exit_code?,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        })
    }
}

/// A named, ordered collection of commands executed as one unit.
#[derive(Debug)]
pub struct CommandGroup {
    name: String,
    mode: GroupMode,
    commands: Vec<CommandId>,
    dependency: Option<NodeId>,
    stdout: String,
    stderr: String,
}

impl CommandGroup {
    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serial or parallel.
    #[must_use]
    pub const fn mode(&self) -> GroupMode {
        self.mode
    }

    /// Member commands in order.
    #[must_use]
    pub fn commands(&self) -> &[CommandId] {
        &self.commands
    }

    /// Node this group waits for, if any.
    #[must_use]
    pub const fn dependency(&self) -> Option<NodeId> {
        self.dependency
    }

    /// Output of the first failed or canceled member, as of the last
    /// [`TaskGraph::update_status`].
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Error output of the first failed or canceled member, as of the last
    /// [`TaskGraph::update_status`].
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}

/// Owner of every command and group of a setup run.
#[derive(Debug, Default)]
pub struct TaskGraph {
    commands: Vec<Command>,
    groups: Vec<CommandGroup>,
}

impl TaskGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a standalone command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownNode`] when `dependency` is not part of
    /// this graph.
    pub fn add_command(
        &mut self,
        template: impl Into<String>,
        dependency: Option<NodeId>,
    ) -> Result<CommandId, CommandError> {
        if let Some(node) = dependency {
            self.ensure_exists(node)?;
        }
        let id = CommandId(self.commands.len());
        self.commands.push(Command::new(template.into(), dependency));
        Ok(id)
    }

    /// Appends a group built from `templates`. In serial mode every command
    /// after the first depends on the one before it.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownNode`] when `dependency` is not part of
    /// this graph.
    pub fn add_group<I, S>(
        &mut self,
        name: impl Into<String>,
        mode: GroupMode,
        templates: I,
        dependency: Option<NodeId>,
    ) -> Result<GroupId, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(node) = dependency {
            self.ensure_exists(node)?;
        }
        let mut commands = Vec::new();
        let mut previous: Option<CommandId> = None;
        for template in templates {
            let link = match mode {
                GroupMode::Serial => previous.map(NodeId::Command),
                GroupMode::Parallel => None,
            };
            let id = CommandId(self.commands.len());
            self.commands.push(Command::new(template.into(), link));
            commands.push(id);
            previous = Some(id);
        }

        let id = GroupId(self.groups.len());
        self.groups.push(CommandGroup {
            name: name.into(),
            mode,
            commands,
            dependency,
            stdout: String::new(),
            stderr: String::new(),
        });
        Ok(id)
    }

    /// Returns the command with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownNode`] for an id from another graph.
    pub fn command(&self, id: CommandId) -> Result<&Command, CommandError> {
        self.commands
            .get(id.0)
            .ok_or(CommandError::UnknownNode(NodeId::Command(id)))
    }

    /// Returns the group with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownNode`] for an id from another graph.
    pub fn group(&self, id: GroupId) -> Result<&CommandGroup, CommandError> {
        self.groups
            .get(id.0)
            .ok_or(CommandError::UnknownNode(NodeId::Group(id)))
    }

    pub(super) fn command_mut(&mut self, id: CommandId) -> Result<&mut Command, CommandError> {
        self.commands
            .get_mut(id.0)
            .ok_or(CommandError::UnknownNode(NodeId::Command(id)))
    }

    /// Status of a command, or the derived status of a group. Unknown ids
    /// report [`Status::NotExecuted`].
    #[must_use]
    pub fn status(&self, node: impl Into<NodeId>) -> Status {
        match node.into() {
            NodeId::Command(id) => self
                .commands
                .get(id.0)
                .map_or(Status::NotExecuted, Command::status),
            NodeId::Group(id) => self
                .groups
                .get(id.0)
                .map_or(Status::NotExecuted, |group| self.derive_status(group)),
        }
    }

    /// Recomputes a group's status and refreshes its aggregate output from
    /// the first failed or canceled member.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownNode`] for an id from another graph.
    pub fn update_status(&mut self, id: GroupId) -> Result<Status, CommandError> {
        let group = self.group(id)?;
        let status = self.derive_status(group);
        let culprit = group
            .commands
            .iter()
            .filter_map(|child| self.commands.get(child.0))
            .find(|child| child.status.is_failed() || child.status.is_canceled());

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(child) = culprit {
            append_line(&mut stdout, &child.stdout);
            append_line(&mut stderr, &child.stderr);
        }

        if let Some(group) = self.groups.get_mut(id.0) {
            group.stdout = stdout;
            group.stderr = stderr;
        }
        Ok(status)
    }

    /// Marks every member of a group as canceled.
    pub(super) fn cancel_group(&mut self, id: GroupId) -> Result<(), CommandError> {
        let members = self.group(id)?.commands.clone();
        for member in members {
            self.command_mut(member)?.status = Status::Canceled;
        }
        Ok(())
    }

    /// Short human description of a node for error messages.
    pub(super) fn describe(&self, node: NodeId) -> String {
        match node {
            NodeId::Command(id) => self.commands.get(id.0).map_or_else(
                || node.to_string(),
                |command| command.template.clone(),
            ),
            NodeId::Group(id) => self.groups.get(id.0).map_or_else(
                || node.to_string(),
                |group| format!("group {}", group.name),
            ),
        }
    }

    fn derive_status(&self, group: &CommandGroup) -> Status {
        let statuses: Vec<Status> = group
            .commands
            .iter()
            .map(|child| self.status(*child))
            .collect();

        if let Some(status) = statuses
            .iter()
            .find(|status| status.is_failed() || status.is_canceled())
        {
            return *status;
        }
        if statuses.iter().all(|status| status.is_done()) {
            return Status::Done;
        }
        if statuses.iter().all(|status| status.is_not_executed()) {
            return Status::NotExecuted;
        }
        Status::Executing
    }

    fn ensure_exists(&self, node: NodeId) -> Result<(), CommandError> {
        let exists = match node {
            NodeId::Command(id) => id.0 < self.commands.len(),
            NodeId::Group(id) => id.0 < self.groups.len(),
        };
        if exists {
            Ok(())
        } else {
            Err(CommandError::UnknownNode(node))
        }
    }
}

fn append_line(buffer: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    buffer.push_str(text);
    if !text.ends_with('\n') {
        buffer.push('\n');
    }
}
