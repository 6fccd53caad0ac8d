//! Core library for the dropship provisioning tool.
//!
//! The crate drives a dependency-aware graph of shell commands over an SSH
//! transport. Completion records kept on the remote host make every pass
//! idempotent: a command that already succeeded is skipped on the next run.
//! Provisioned components (database, cache, web application) build on that
//! engine with a select-or-create workflow, and a Scaleway provider finds or
//! creates the host to run on.

pub mod command;
pub mod component;
pub mod config;
pub mod env_file;
pub mod host;
pub mod logging;
pub mod provision;
pub mod repo;
pub mod status;
pub mod store;
pub mod test_support;
pub mod transport;

pub use command::{
    Command, CommandError, CommandGroup, CommandId, Engine, GroupId, GroupMode, NodeId, Params,
    TaskGraph, TemplateError, escape_braces, resolve,
};
pub use component::{
    Component, ComponentError, Database, DatabaseBackup, DatabaseUser, PresetSelector,
    RedisCache, Selection, Selector, Stage, WebApp, WebAppOptions, run_stages, setup_or_select,
};
pub use config::{ConfigError, ProvisionConfig, ScalewayConfig};
pub use env_file::{EnvFile, EnvFileError};
pub use host::{HostError, HostHandle, HostProvider, HostRequest, ScalewayHosts};
pub use provision::{ProvisionError, ProvisionReport};
pub use repo::RepoSource;
pub use status::Status;
pub use store::{CompletionRecord, CompletionStore, DEFAULT_STATE_DIR, StoreError, fingerprint};
pub use transport::{
    CommandOutput, CommandResult, CommandRunner, FileChannel, PendingCommand,
    ProcessCommandRunner, SshTransport, Transport, TransportConfig, TransportError,
};
