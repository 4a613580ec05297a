use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Environment prefix for every configuration key, e.g. `CREDSTORE_DATABASE_URL`.
pub const ENV_PREFIX: &str = "CREDSTORE_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// sqlx SQLite URL, e.g. `sqlite:credentials.sqlite` or `sqlite::memory:`.
    pub database_url: String,
    pub max_connections: u32,
    /// How long a connection waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
    /// How long an operation waits for a pooled connection.
    pub acquire_timeout_ms: u64,
    pub loglevel: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:credentials.sqlite".to_string(),
            max_connections: 4,
            busy_timeout_ms: 5_000,
            acquire_timeout_ms: 5_000,
            loglevel: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Defaults overlaid with `CREDSTORE_*` environment variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(StoreConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load() -> Result<Self, StoreError> {
        Ok(Self::figment().extract()?)
    }

    /// Like [`StoreConfig::load`], reading a `.env` file first when one exists.
    pub fn from_env() -> Result<Self, StoreError> {
        dotenvy::dotenv().ok();
        Self::load()
    }

    /// Config for a private in-memory database. Handy for tests and tooling.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}
