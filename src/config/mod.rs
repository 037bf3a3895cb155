use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    /// Record login attempts that resolved to an account but failed
    /// verification. Successful logins are always recorded.
    pub audit_failures: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default values
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.url", "sqlite://warden.db")?
            .set_default("database.max_connections", 5)?
            .set_default("database.busy_timeout_secs", 5)?
            .set_default("auth.jwt_secret", "development_secret")?
            .set_default("auth.access_token_ttl_minutes", 15)?
            .set_default("auth.refresh_token_ttl_days", 7)?
            .set_default("auth.argon2_memory_kib", 19456)?
            .set_default("auth.argon2_iterations", 2)?
            .set_default("auth.audit_failures", false)?

            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))

            // Add in settings from environment variables (with prefix "APP_")
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        s.try_deserialize()
    }

    #[cfg(test)]
    pub fn new_for_test() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("environment", "test")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.url", "sqlite::memory:")?
            .set_default("database.max_connections", 1)?
            .set_default("database.busy_timeout_secs", 5)?
            .set_default("auth.jwt_secret", "test_secret")?
            .set_default("auth.access_token_ttl_minutes", 15)?
            .set_default("auth.refresh_token_ttl_days", 7)?
            // Small memory cost keeps hashing fast in the test suite.
            .set_default("auth.argon2_memory_kib", 8192)?
            .set_default("auth.argon2_iterations", 1)?
            .set_default("auth.audit_failures", false)?
            .build()?
            .try_deserialize()
    }
}
