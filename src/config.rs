use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Application configuration with validation.
///
/// Values come from `config/default.toml`, an optional per-environment file,
/// and `APP__`-prefixed environment variables, last one wins.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 200))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Run embedded migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deployment environment: development, test, production
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

impl AppConfig {
    /// Builds a configuration programmatically, mainly for tests and
    /// embedded usage where no config files exist.
    pub fn new(database_url: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            auto_migrate: false,
            log_level: default_log_level(),
            environment: environment.into(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Loads configuration from files and environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    let env_path = Path::new(CONFIG_DIR).join(format!("{}.toml", environment));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    let settings = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;

    config
        .validate()
        .map_err(|e| ConfigError::Message(format!("Invalid configuration: {}", e)))?;

    info!(
        environment = %config.environment,
        max_connections = config.db_max_connections,
        "Configuration loaded"
    );

    Ok(config)
}
