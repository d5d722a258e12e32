//! Service configuration loader for Parley.
//!
//! Reads an optional TOML file into [`ServiceConfig`] and then applies
//! environment overrides. A missing file yields the defaults; a file that
//! exists but cannot be read or parsed is an error, so the consumer never
//! starts against a broker or database it was not pointed at.

use std::path::{Path, PathBuf};

use parley_types::config::ServiceConfig;
use thiserror::Error;

/// Environment variables that override file values.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_AMQP_URL: &str = "RABBITMQ_URL";
pub const ENV_AMQP_QUEUE: &str = "RABBITMQ_QUEUE";
pub const ENV_HTTP_PORT: &str = "PORT";
pub const ENV_HTTP_HOST: &str = "PARLEY_HOST";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

/// Load configuration from `path`, then apply process environment overrides.
pub async fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let mut config = load_file(path).await?;
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    Ok(config)
}

async fn load_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(ServiceConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply overrides from `lookup`, which maps a variable name to its value.
pub fn apply_env_overrides(
    config: &mut ServiceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(url) = lookup(ENV_DATABASE_URL) {
        config.database.url = url;
    }
    if let Some(url) = lookup(ENV_AMQP_URL) {
        config.amqp.url = url;
    }
    if let Some(queue) = lookup(ENV_AMQP_QUEUE) {
        config.amqp.queue = queue;
    }
    if let Some(host) = lookup(ENV_HTTP_HOST) {
        config.http.host = host;
    }
    if let Some(port) = lookup(ENV_HTTP_PORT) {
        config.http.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: ENV_HTTP_PORT,
            value: port.clone(),
        })?;
    }
    Ok(())
}
