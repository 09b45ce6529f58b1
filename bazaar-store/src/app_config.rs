use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Absent means the in-memory store backs the process (dev/test).
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub merchant_id: String,
    #[serde(default = "default_sandbox")]
    pub sandbox: bool,
    /// Finite HTTP timeout for provider round-trips.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_gateway")]
    pub default_gateway: String,
    /// Public base URL the provider redirects back to.
    pub callback_base_url: String,
}

fn default_sandbox() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_gateway() -> String {
    "zarinpal".to_string()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment file, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // E.g. `BAZAAR__SERVER__PORT=8080`
            .add_source(config::Environment::with_prefix("BAZAAR").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
