use serde::Deserialize;

/// Process configuration, read from the environment (and `.env` when present)
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub db_max_connections: u32,
    /// Upper bound on any row-lock wait inside a transaction
    pub lock_timeout_ms: u64,
    pub request_timeout_secs: u64,
    pub rate_limit_per_minute: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("database_url", "postgresql://localhost/coop_lending")?
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("db_max_connections", 20)?
            .set_default("lock_timeout_ms", 5000)?
            .set_default("request_timeout_secs", 30)?
            .set_default("rate_limit_per_minute", 600)?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
