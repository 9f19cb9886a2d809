//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "bf-dispatch.toml",
    "./config/config.toml",
    "/etc/bf-dispatch/config.toml",
];

pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("BF_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Apply `BF_*` overrides using the given variable lookup
fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Redis
    if let Some(val) = lookup("BF_REDIS_URL") {
        config.redis.url = val;
    }

    // AMQP
    if let Some(val) = lookup("BF_AMQP_URI") {
        config.amqp.uri = val;
    }
    if let Some(val) = lookup("BF_AMQP_CONNECTION_NAME") {
        config.amqp.connection_name = val;
    }
    if let Some(val) = lookup("BF_AMQP_DECLARE_EXCHANGES") {
        config.amqp.declare_exchanges = val.parse().unwrap_or(true);
    }

    // SMS
    if let Some(val) = lookup("BF_SMS_EXCHANGE") {
        config.sms.exchange = val;
    }
    if let Some(val) = lookup("BF_SMS_BROKERS") {
        config.sms.brokers = split_list(&val);
    }
    if let Some(val) = lookup("BF_SMS_RESULT_TTL_SECS") {
        if let Ok(ttl) = val.parse() {
            config.sms.result_ttl_secs = ttl;
        }
    }

    // Chat
    if let Some(val) = lookup("BF_CHAT_EXCHANGE") {
        config.chat.exchange = val;
    }
    if let Some(val) = lookup("BF_CHAT_BROKERS") {
        config.chat.brokers = split_list(&val);
    }
    if let Some(val) = lookup("BF_CHAT_SCRATCH_TTL_SECS") {
        if let Ok(ttl) = val.parse() {
            config.chat.scratch_ttl_secs = ttl;
        }
    }
    if let Some(val) = lookup("BF_CHAT_SHADOW_TTL_SECS") {
        if let Ok(ttl) = val.parse() {
            config.chat.shadow_ttl_secs = ttl;
        }
    }

    // Directory
    if let Some(val) = lookup("BF_DIRECTORY_PATH") {
        config.directory.path = val;
    }
}
