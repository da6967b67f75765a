//! Configuration system
//! Loads everything from environment variables, sensitive values wrapped in Secret

use config::{Config, ConfigError, Environment};
use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. "0.0.0.0:3000"
    pub addr: String,
    /// Graceful shutdown timeout (seconds)
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL (Secret so it never reaches the logs)
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Acquire timeout (seconds)
    pub acquire_timeout_secs: u64,
    /// Idle connection timeout (seconds)
    pub idle_timeout_secs: u64,
    /// Max connection lifetime (seconds)
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    /// json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Idle minutes before a session expires (sliding window)
    pub session_timeout_minutes: u32,
    /// Consecutive failures that trigger a lockout
    pub max_login_attempts: u32,
    /// How long a lockout lasts
    pub lockout_duration_minutes: u32,
    /// Failures older than this no longer count toward the threshold
    pub attempt_window_minutes: u32,
    /// Minimum password length, enforced when a password is set
    pub password_min_length: usize,
    /// Argon2 memory cost (KiB)
    pub argon2_memory_kib: u32,
    /// Argon2 time cost
    pub argon2_iterations: u32,
    /// Argon2 lanes
    pub argon2_parallelism: u32,
    /// Interval of the expired-entry sweep; 0 disables it
    pub sweep_interval_secs: u64,
    /// Trust X-Forwarded-For when logging client addresses
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// Countries the dashboard serves data for
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    /// TOML file with `[users.<identity>]` tables seeded at startup
    pub users_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Absent means volatile in-memory stores; filled by `database_from_env`
    #[serde(skip)]
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub access: AccessConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    /// Load configuration from the environment (prefix `DASH_`, nesting `__`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        settings = settings
            .set_default("server.addr", "0.0.0.0:3000")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("security.session_timeout_minutes", 30)?
            .set_default("security.max_login_attempts", 5)?
            .set_default("security.lockout_duration_minutes", 15)?
            .set_default("security.attempt_window_minutes", 15)?
            .set_default("security.password_min_length", 6)?
            .set_default("security.argon2_memory_kib", 19456)?
            .set_default("security.argon2_iterations", 2)?
            .set_default("security.argon2_parallelism", 1)?
            .set_default("security.sweep_interval_secs", 300)?
            .set_default("security.trust_proxy", true)?
            .set_default(
                "access.countries",
                vec!["Uganda", "Cameroon", "Lesotho", "Malawi"],
            )?;

        settings = settings.add_source(
            Environment::with_prefix("DASH")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("access.countries")
                .try_parsing(true),
        );

        let mut config: AppConfig = settings.build()?.try_deserialize()?;
        config.database = Self::database_from_env()?;

        config.validate()?;

        Ok(config)
    }

    /// Load the database section separately so pool defaults apply only when a URL is set
    pub fn database_from_env() -> Result<Option<DatabaseConfig>, ConfigError> {
        let url = match std::env::var("DASH_DATABASE__URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => return Ok(None),
        };

        let settings = Config::builder()
            .set_default("max_connections", 10)?
            .set_default("min_connections", 2)?
            .set_default("acquire_timeout_secs", 30)?
            .set_default("idle_timeout_secs", 600)?
            .set_default("max_lifetime_secs", 1800)?
            .set_override("url", url)?
            .add_source(
                Environment::with_prefix("DASH_DATABASE")
                    .prefix_separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(Some(settings.try_deserialize()?))
    }

    /// Reject values the gate cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        if let Some(db) = &self.database {
            if db.max_connections < db.min_connections {
                return Err(ConfigError::Message(
                    "max_connections must be >= min_connections".to_string(),
                ));
            }
        }

        let security = &self.security;

        if !(1..=1440).contains(&security.session_timeout_minutes) {
            return Err(ConfigError::Message(
                "session_timeout_minutes must be between 1 and 1440".to_string(),
            ));
        }

        if !(1..=20).contains(&security.max_login_attempts) {
            return Err(ConfigError::Message(
                "max_login_attempts must be between 1 and 20".to_string(),
            ));
        }

        if !(1..=1440).contains(&security.lockout_duration_minutes) {
            return Err(ConfigError::Message(
                "lockout_duration_minutes must be between 1 and 1440".to_string(),
            ));
        }

        if !(1..=1440).contains(&security.attempt_window_minutes) {
            return Err(ConfigError::Message(
                "attempt_window_minutes must be between 1 and 1440".to_string(),
            ));
        }

        if security.password_min_length < 6 || security.password_min_length > 128 {
            return Err(ConfigError::Message(
                "password_min_length must be between 6 and 128".to_string(),
            ));
        }

        if security.argon2_parallelism == 0
            || security.argon2_iterations == 0
            || security.argon2_memory_kib < 8 * security.argon2_parallelism
        {
            return Err(ConfigError::Message(
                "argon2 parameters out of range (memory_kib >= 8 * parallelism, iterations >= 1)"
                    .to_string(),
            ));
        }

        if self.access.countries.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::Message(
                "access.countries must list at least one country".to_string(),
            ));
        }

        Ok(())
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        self.security.session_timeout()
    }
}

impl SecurityConfig {
    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.session_timeout_minutes))
    }

    pub fn lockout_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.lockout_duration_minutes))
    }

    pub fn attempt_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.attempt_window_minutes))
    }
}
