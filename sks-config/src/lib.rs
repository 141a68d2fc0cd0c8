//! Configuration management for the Security Keys Service
//!
//! Values come from `SKS_*` environment variables (a `.env` file is loaded
//! first when present), on top of built-in defaults:
//!
//! | Variable                 | Default                                   |
//! |--------------------------|-------------------------------------------|
//! | `SKS_ROLE`               | `master` (`master`, `pull` or `push`)     |
//! | `SKS_SECURITY_GROUPS`    | `sgid_1` (comma separated)                |
//! | `SKS_SECURITY_POLICY_URI`| PubSub Aes256-CTR                         |
//! | `SKS_KEY_LIFETIME_MS`    | `10000`                                   |
//! | `SKS_MAX_KEYS`           | `20`                                      |
//! | `SKS_GENERATED_KEYS`     | `5`                                       |
//! | `SKS_INITIAL_PERIOD_MS`  | `1000`                                    |
//! | `SKS_ADMIN_USER`         | `sks_admin`                               |
//! | `SKS_HEALTH_PORT`        | unset (no health endpoint)                |
//! | `SKS_LOG_LEVEL`          | `info`                                    |
//! | `SKS_LOG_FORMAT`         | `console` (`console` or `json`)           |

use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

const ENV_PREFIX: &str = "SKS";
const DEFAULT_POLICY_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes256-CTR";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How this node obtains the keys it serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SksRole {
    /// Generates keys locally
    Master,
    /// Pulls keys from another key service
    Pull,
    /// Generates keys locally and pushes them to another key service
    Push,
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SksConfig {
    pub role: SksRole,
    pub security_groups: Vec<String>,
    pub security_policy_uri: String,
    pub key_lifetime_ms: u32,
    /// Upper bound of tokens kept per security group
    pub max_keys: u32,
    /// Keys generated on each scheduler run
    pub generated_keys: u32,
    /// Delay before the first scheduler run
    pub initial_period_ms: u32,
    /// Only user allowed to call the key service methods
    pub admin_user: String,
    pub health_port: Option<u16>,
    pub log_level: String,
    pub log_format: String,
}

impl SksConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        Self::load(Environment::with_prefix(ENV_PREFIX))
    }

    /// Load configuration from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn load(environment: Environment) -> Result<Self, ConfigError> {
        let environment = environment
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("security_groups");

        let config: SksConfig = Config::builder()
            .set_default("role", "master")?
            .set_default("security_groups", vec!["sgid_1"])?
            .set_default("security_policy_uri", DEFAULT_POLICY_URI)?
            .set_default("key_lifetime_ms", 10_000)?
            .set_default("max_keys", 20)?
            .set_default("generated_keys", 5)?
            .set_default("initial_period_ms", 1000)?
            .set_default("admin_user", "sks_admin")?
            .set_default("log_level", "info")?
            .set_default("log_format", "console")?
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security_groups.is_empty() {
            return Err(ConfigError::Invalid("no security group configured".to_string()));
        }
        if self.security_groups.iter().any(|id| id.trim().is_empty()) {
            return Err(ConfigError::Invalid("empty security group id".to_string()));
        }
        if self.security_policy_uri.is_empty() {
            return Err(ConfigError::Invalid("security policy URI is empty".to_string()));
        }
        if self.key_lifetime_ms == 0 {
            return Err(ConfigError::Invalid("key lifetime must be greater than 0".to_string()));
        }
        if self.max_keys == 0 || self.generated_keys == 0 {
            return Err(ConfigError::Invalid(
                "max_keys and generated_keys must be greater than 0".to_string(),
            ));
        }
        if self.generated_keys > self.max_keys {
            return Err(ConfigError::Invalid(format!(
                "generated_keys ({}) exceeds max_keys ({})",
                self.generated_keys, self.max_keys
            )));
        }
        if self.initial_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "initial period must be greater than 0".to_string(),
            ));
        }
        if self.admin_user.is_empty() {
            return Err(ConfigError::Invalid("admin user is empty".to_string()));
        }
        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "json" | "console") {
            return Err(ConfigError::Invalid(format!(
                "unknown log format: {}",
                self.log_format
            )));
        }
        Ok(())
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        if self.log_level.is_empty() {
            "info"
        } else {
            &self.log_level
        }
    }
}
