//! Redis cache shared by every application on the host.

use serde::{Deserialize, Serialize};

use crate::command::{Engine, Params};
use crate::transport::Transport;

use super::{Component, ComponentError, Stage, run_stages};

/// Name of the single cache record.
pub const CACHE_NAME: &str = "redis";

/// The host's Redis server. Only one may be recorded per host.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RedisCache {
    name: String,
    initialized: bool,
    db_index: u32,
}

impl Default for RedisCache {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RedisCache {
    /// Describes a cache using logical database `db_index`.
    #[must_use]
    pub fn new(db_index: u32) -> Self {
        Self {
            name: String::from(CACHE_NAME),
            initialized: false,
            db_index,
        }
    }

    /// Logical database index used by the application.
    #[must_use]
    pub const fn db_index(&self) -> u32 {
        self.db_index
    }

    /// Connection URL for applications on the same host.
    #[must_use]
    pub fn url(&self) -> String {
        format!("redis://127.0.0.1:6379/{}", self.db_index)
    }

    /// Template bindings under the `cache.` prefix.
    #[must_use]
    pub fn params(&self) -> Params {
        Params::new().with("cache.url", self.url())
    }
}

impl Component for RedisCache {
    const TYPE_NAME: &'static str = "RedisCache";
    const SINGLETON: bool = true;

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
        let stages = vec![Stage::serial(
            "redis",
            [
                "apt install -y redis-server",
                "sed -i 's/^supervised no/supervised systemd/' /etc/redis/redis.conf",
                "systemctl restart redis-server",
                "systemctl enable redis-server",
            ],
        )];
        run_stages(engine, stages, &self.params())?;
        Ok(())
    }
}
