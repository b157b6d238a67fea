//! Connection settings for the PostgreSQL database holding the `migration` schema.

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

/// Where the control plane keeps deployed definitions, instance state, history
/// and batches. All tables live in the `migration` schema, created at startup
/// by `db::schema::init_schema` when `MIGRATION_INIT_SCHEMA` is set.
///
/// Read from `POSTGRES_*` variables:
/// - `POSTGRES_HOST` (default "localhost")
/// - `POSTGRES_PORT` (default "5432")
/// - `POSTGRES_USER` (default "migration")
/// - `POSTGRES_PASSWORD`
/// - `POSTGRES_DATABASE` (default "migration")
/// - `POSTGRES_MAX_CONNECTIONS`, `POSTGRES_MIN_CONNECTIONS`, `POSTGRES_ACQUIRE_TIMEOUT`
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Database that contains the `migration` schema.
    #[serde(default = "default_database")]
    pub database: String,

    /// Pool ceiling shared by API requests and batch part jobs.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connections kept open while idle.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection before a query fails.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> String {
    "5432".to_string()
}

fn default_user() -> String {
    "migration".to_string()
}

fn default_database() -> String {
    "migration".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout() -> u64 {
    30
}

impl DatabaseConfig {
    /// Read the `POSTGRES_*` variables, filling in defaults.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("POSTGRES_").from_env::<DatabaseConfig>()
    }

    /// Connection options for the pool; an unparsable port falls back to 5432.
    pub fn connect_options(&self) -> PgConnectOptions {
        let port: u16 = self.port.parse().unwrap_or(5432);

        PgConnectOptions::new()
            .host(&self.host)
            .port(port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}
