//! PostgreSQL database, its owner role and WAL archiving.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::command::{Engine, Params, TaskGraph};
use crate::transport::Transport;

use super::{Component, ComponentError, Stage, run_stages};

const PSQL: &str = "cd /tmp && sudo -u postgres psql -c";

/// Directory WAL segments are archived to.
pub const ARCHIVE_DIR: &str = "/database/backup/archive";

/// Directory the base backup is written to.
pub const BACKUP_DIR: &str = "/database/backup/backup";

/// Login role owning the database.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DatabaseUser {
    /// Role name.
    pub name: String,
    /// Role password.
    pub password: String,
}

impl DatabaseUser {
    /// Creates a role, generating a random password when none is given.
    #[must_use]
    pub fn new(name: impl Into<String>, password: Option<String>) -> Self {
        Self {
            name: name.into(),
            password: password.unwrap_or_else(generate_password),
        }
    }

    fn templates() -> Vec<String> {
        vec![
            format!("{PSQL} \"CREATE USER {{db.user}} WITH PASSWORD '{{db.password}}';\""),
            format!("{PSQL} \"ALTER ROLE {{db.user}} SET client_encoding TO 'utf8';\""),
            format!(
                "{PSQL} \"ALTER ROLE {{db.user}} SET default_transaction_isolation TO 'read committed';\""
            ),
            format!("{PSQL} \"ALTER ROLE {{db.user}} SET timezone TO 'UTC';\""),
            format!("{PSQL} \"ALTER DATABASE {{db.name}} OWNER TO {{db.user}};\""),
        ]
    }
}

/// WAL archiving and base backup settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DatabaseBackup {
    /// Archive directory for WAL segments.
    pub archive_dir: String,
    /// Base backup directory.
    pub backup_dir: String,
    /// `postgresql.conf` path, discovered during setup.
    pub config_file: Option<String>,
}

impl Default for DatabaseBackup {
    fn default() -> Self {
        Self {
            archive_dir: String::from(ARCHIVE_DIR),
            backup_dir: String::from(BACKUP_DIR),
            config_file: None,
        }
    }
}

impl DatabaseBackup {
    fn templates(&self) -> Vec<String> {
        let archive = &self.archive_dir;
        vec![
            format!("mkdir -p {archive}"),
            format!("chown postgres:postgres {archive}"),
            String::from("echo \"archive_mode = on\" | sudo tee -a {db.config}"),
            format!(
                "echo \"archive_command = 'test ! -f {archive}/%f && cp %p {archive}/%f'\" | sudo tee -a {{db.config}}"
            ),
            String::from("echo \"wal_level = replica\" | sudo tee -a {db.config}"),
            String::from("systemctl restart postgresql"),
            format!("sudo -u postgres pg_basebackup -D {}", self.backup_dir),
        ]
    }
}

/// One entry of `pg_lsclusters --json`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ClusterInfo {
    /// Configuration directory, e.g. `/etc/postgresql/14/main`.
    pub configdir: String,
    /// Data directory.
    pub pgdata: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClusterPayload {
    Many(Vec<ClusterInfo>),
    One(ClusterInfo),
}

impl ClusterInfo {
    /// Parses `pg_lsclusters --json` output and returns the first cluster.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidClusterInfo`] for malformed output or
    /// an empty cluster list.
    pub fn parse(stdout: &str) -> Result<Self, ComponentError> {
        let payload: ClusterPayload =
            serde_json::from_str(stdout).map_err(|err| ComponentError::InvalidClusterInfo {
                message: err.to_string(),
            })?;
        match payload {
            ClusterPayload::One(info) => Ok(info),
            ClusterPayload::Many(infos) => {
                infos
                    .into_iter()
                    .next()
                    .ok_or_else(|| ComponentError::InvalidClusterInfo {
                        message: String::from("no clusters listed"),
                    })
            }
        }
    }

    /// Path of the cluster's `postgresql.conf`.
    #[must_use]
    pub fn config_file(&self) -> String {
        format!("{}/postgresql.conf", self.configdir.trim_end_matches('/'))
    }
}

/// A PostgreSQL database with its owner role.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Database {
    name: String,
    initialized: bool,
    user: DatabaseUser,
    backup: Option<DatabaseBackup>,
}

impl Database {
    /// Describes a database that has not been set up yet.
    #[must_use]
    pub fn new(name: impl Into<String>, user: DatabaseUser, backup: bool) -> Self {
        Self {
            name: name.into(),
            initialized: false,
            user,
            backup: backup.then(DatabaseBackup::default),
        }
    }

    /// Owner role.
    #[must_use]
    pub const fn user(&self) -> &DatabaseUser {
        &self.user
    }

    /// Backup settings, when archiving is enabled.
    #[must_use]
    pub const fn backup(&self) -> Option<&DatabaseBackup> {
        self.backup.as_ref()
    }

    /// Connection URL for applications on the same host.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@127.0.0.1:5432/{}",
            self.user.name, self.user.password, self.name
        )
    }

    /// Template bindings under the `db.` prefix.
    #[must_use]
    pub fn params(&self) -> Params {
        let mut params = Params::new()
            .with("db.name", self.name.as_str())
            .with("db.user", self.user.name.as_str())
            .with("db.password", self.user.password.as_str())
            .with("db.url", self.url());
        if let Some(config) = self.backup.as_ref().and_then(|b| b.config_file.as_deref()) {
            params.insert("db.config", config);
        }
        params
    }

    fn setup_backup<T: Transport + ?Sized>(
        &mut self,
        engine: &Engine<'_, T>,
    ) -> Result<(), ComponentError> {
        let Some(backup) = self.backup.as_mut() else {
            return Ok(());
        };

        let mut graph = TaskGraph::new();
        let probe = graph.add_command("pg_lsclusters --json", None)?;
        engine.exec(&mut graph, probe, false, &Params::new())?;
        let cluster = ClusterInfo::parse(graph.command(probe)?.stdout())?;
        info!(configdir = %cluster.configdir, "found PostgreSQL cluster");
        backup.config_file = Some(cluster.config_file());

        let stages = vec![Stage::serial("database backup", backup.templates())];
        run_stages(engine, stages, &self.params())?;
        Ok(())
    }
}

impl Component for Database {
    const TYPE_NAME: &'static str = "Database";

    fn name(&self) -> &str {
        &self.name
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    fn setup<T: Transport + ?Sized>(&mut self, engine: &Engine<'_, T>) -> Result<(), ComponentError> {
        let stages = vec![
            Stage::serial(
                "postgresql packages",
                ["apt install -y libpq-dev postgresql postgresql-contrib libjson-perl"],
            ),
            Stage::serial(
                "database",
                [format!("{PSQL} \"CREATE DATABASE {{db.name}};\"")],
            ),
            Stage::serial("database user", DatabaseUser::templates()),
        ];
        run_stages(engine, stages, &self.params())?;
        self.setup_backup(engine)
    }
}

fn generate_password() -> String {
    Uuid::new_v4().simple().to_string()
}
