//! Provisioned components: software stacks installed on the host.
//!
//! A component is a named, persisted unit of setup. [`setup_or_select`]
//! either resumes a recorded instance or creates a new one, and setup itself
//! is a list of [`Stage`]s executed through the command engine, so every step
//! that already succeeded is skipped on a rerun.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::command::{CommandError, Engine, GroupMode, NodeId, Params, TaskGraph};
use crate::store::{StoreError, validate_name};
use crate::transport::{Transport, TransportError};

mod app;
mod cache;
mod database;
mod units;

pub use app::{WebApp, WebAppOptions};
pub use cache::RedisCache;
pub use database::{ClusterInfo, Database, DatabaseBackup, DatabaseUser};
pub use units::{gunicorn_unit, nginx_site};

/// Errors raised while selecting or setting up a component.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// A singleton type has more than one record on the host.
    #[error("found {count} {type_name} records on the host; only one is allowed")]
    MultipleComponentsFound {
        /// Component type name.
        type_name: &'static str,
        /// Number of records found.
        count: usize,
    },
    /// A new instance would overwrite an existing record.
    #[error("{type_name} '{name}' already exists; select it instead of creating a new one")]
    DuplicateComponent {
        /// Component type name.
        type_name: &'static str,
        /// Instance name.
        name: String,
    },
    /// The selector chose a name with no record.
    #[error("no {type_name} named '{name}' is recorded on the host")]
    UnknownComponent {
        /// Component type name.
        type_name: &'static str,
        /// Requested instance name.
        name: String,
    },
    /// Several records exist and nothing says which one to use.
    #[error("several {type_name} records exist ({}); choose one by name or request a new one", existing.join(", "))]
    AmbiguousSelection {
        /// Component type name.
        type_name: &'static str,
        /// Names of the existing records.
        existing: Vec<String>,
    },
    /// A listed record disappeared before it could be loaded.
    #[error("record for {type_name} '{name}' vanished while loading")]
    MissingRecord {
        /// Component type name.
        type_name: &'static str,
        /// Instance name.
        name: String,
    },
    /// `pg_lsclusters` output could not be interpreted.
    #[error("cannot read PostgreSQL cluster information: {message}")]
    InvalidClusterInfo {
        /// Parser or validation message.
        message: String,
    },
    /// A setup command failed.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Reading or writing a record failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Writing a configuration file failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A persisted, selectable unit of host setup.
pub trait Component: Serialize + DeserializeOwned {
    /// Record type name; also the file suffix in the state directory.
    const TYPE_NAME: &'static str;

    /// At most one instance may exist per host.
    const SINGLETON: bool = false;

    /// Instance name; the record key.
    fn name(&self) -> &str;

    /// Whether setup has completed once.
    fn is_initialized(&self) -> bool;

    /// Records that setup completed.
    fn mark_initialized(&mut self);

    /// Runs the component's setup on the engine's host.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] when a setup command or file write fails.
    fn setup<T: Transport + ?Sized>(&mut self, engine: &Engine<'_, T>) -> Result<(), ComponentError>;

    /// Rebuilds an instance from its stored record.
    ///
    /// # Errors
    ///
    /// Returns the decoder error when the record does not match the type.
    fn from_record(record: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(record)
    }
}

/// Outcome of a [`Selector`] decision.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Selection {
    /// Use the recorded instance with this name.
    Existing(String),
    /// Build a fresh instance.
    CreateNew,
}

/// Chooses between recorded instances and a fresh one.
pub trait Selector {
    /// Picks an instance of `type_name` among `existing` (never empty).
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::AmbiguousSelection`] when no choice can be
    /// made.
    fn select(&self, type_name: &'static str, existing: &[String])
    -> Result<Selection, ComponentError>;
}

/// Non-interactive selector driven by configuration.
///
/// A preset name selects that record when it exists and creates it
/// otherwise. Without a preset, `create_new` forces a fresh instance and a
/// single record is picked automatically.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PresetSelector {
    preset: Option<String>,
    create_new: bool,
}

impl PresetSelector {
    /// Selector that uses `name` if recorded and creates it otherwise.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            preset: Some(name.into()),
            create_new: false,
        }
    }

    /// Selector that always creates a new instance.
    #[must_use]
    pub const fn create_new() -> Self {
        Self {
            preset: None,
            create_new: true,
        }
    }

    /// Selector that picks the only record, if there is exactly one.
    #[must_use]
    pub const fn only_existing() -> Self {
        Self {
            preset: None,
            create_new: false,
        }
    }
}

impl Selector for PresetSelector {
    fn select(
        &self,
        type_name: &'static str,
        existing: &[String],
    ) -> Result<Selection, ComponentError> {
        if let Some(name) = &self.preset {
            return Ok(if existing.contains(name) {
                Selection::Existing(name.clone())
            } else {
                Selection::CreateNew
            });
        }
        if self.create_new {
            return Ok(Selection::CreateNew);
        }
        match existing {
            [only] => Ok(Selection::Existing(only.clone())),
            _ => Err(ComponentError::AmbiguousSelection {
                type_name,
                existing: existing.to_vec(),
            }),
        }
    }
}

/// Selects a recorded component or creates, persists and sets up a new one.
///
/// A fresh instance is saved before setup and again once it is initialized,
/// so an interrupted setup is resumed on the next run. A recorded instance
/// that never finished setup is set up again; its completed commands are
/// skipped.
///
/// # Errors
///
/// Returns [`ComponentError::MultipleComponentsFound`] for a singleton type
/// with several records, [`ComponentError::DuplicateComponent`] when a new
/// instance's name is taken, and any store or setup failure.
pub fn setup_or_select<C, T, S, F>(
    engine: &Engine<'_, T>,
    selector: &S,
    fresh: F,
) -> Result<C, ComponentError>
where
    C: Component,
    T: Transport + ?Sized,
    S: Selector + ?Sized,
    F: FnOnce() -> C,
{
    let store = engine.store();
    let existing = store.list(C::TYPE_NAME)?;

    if C::SINGLETON && existing.len() > 1 {
        return Err(ComponentError::MultipleComponentsFound {
            type_name: C::TYPE_NAME,
            count: existing.len(),
        });
    }

    let selection = match existing.as_slice() {
        [] => Selection::CreateNew,
        [only] if C::SINGLETON => Selection::Existing(only.clone()),
        _ => selector.select(C::TYPE_NAME, &existing)?,
    };

    match selection {
        Selection::CreateNew => {
            let mut component = fresh();
            validate_name(component.name())?;
            if existing.iter().any(|name| name == component.name()) {
                return Err(ComponentError::DuplicateComponent {
                    type_name: C::TYPE_NAME,
                    name: component.name().to_owned(),
                });
            }
            info!(component = C::TYPE_NAME, name = component.name(), "creating component");
            store.save(C::TYPE_NAME, component.name(), &component)?;
            initialize(engine, &mut component)?;
            Ok(component)
        }
        Selection::Existing(name) => {
            if !existing.contains(&name) {
                return Err(ComponentError::UnknownComponent {
                    type_name: C::TYPE_NAME,
                    name,
                });
            }
            let record: Value =
                store
                    .load(C::TYPE_NAME, &name)?
                    .ok_or_else(|| ComponentError::MissingRecord {
                        type_name: C::TYPE_NAME,
                        name: name.clone(),
                    })?;
            let mut component = C::from_record(record).map_err(|err| StoreError::Malformed {
                path: store.record_path(C::TYPE_NAME, &name),
                message: err.to_string(),
            })?;
            if component.is_initialized() {
                info!(component = C::TYPE_NAME, name = %name, "using existing component");
            } else {
                info!(component = C::TYPE_NAME, name = %name, "resuming setup");
                initialize(engine, &mut component)?;
            }
            Ok(component)
        }
    }
}

fn initialize<C, T>(engine: &Engine<'_, T>, component: &mut C) -> Result<(), ComponentError>
where
    C: Component,
    T: Transport + ?Sized,
{
    component.setup(engine)?;
    component.mark_initialized();
    engine
        .store()
        .save(C::TYPE_NAME, component.name(), &*component)?;
    Ok(())
}

/// One named group of setup commands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Stage {
    /// Group name used in logs and errors.
    pub name: String,
    /// Serial or parallel execution.
    pub mode: GroupMode,
    /// Command templates.
    pub templates: Vec<String>,
}

impl Stage {
    /// Serial stage.
    #[must_use]
    pub fn serial<I, S>(name: impl Into<String>, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            mode: GroupMode::Serial,
            templates: templates.into_iter().map(Into::into).collect(),
        }
    }
}

/// Executes `stages` in order, each depending on the one before.
///
/// # Errors
///
/// Returns the first stage failure; later stages are not attempted.
pub fn run_stages<T: Transport + ?Sized>(
    engine: &Engine<'_, T>,
    stages: Vec<Stage>,
    params: &Params,
) -> Result<TaskGraph, ComponentError> {
    let mut graph = TaskGraph::new();
    let mut previous: Option<NodeId> = None;
    let mut groups = Vec::with_capacity(stages.len());
    for stage in stages {
        let id = graph.add_group(stage.name, stage.mode, stage.templates, previous)?;
        previous = Some(id.into());
        groups.push(id);
    }
    for id in groups {
        engine.exec_group(&mut graph, id, params)?;
    }
    Ok(graph)
}

#[cfg(test)]
pub(crate) mod tests;
