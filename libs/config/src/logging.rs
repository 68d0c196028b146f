//! Tracing initialisation shared by the staking services and test fixtures

use crate::staking_config::LoggingConfig;
use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. Calling this again after a subscriber
/// is installed is a no-op.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level directive {:?}", config.level))?,
    };

    let installed = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };

    if let Err(e) = installed {
        debug!("Tracing subscriber already installed: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init_tracing(&config).unwrap();
        init_tracing(&LoggingConfig {
            json: true,
            ..config
        })
        .unwrap();
    }

    #[test]
    fn test_invalid_directive_is_reported() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "liquid_staking=loud".to_string(),
            json: false,
        };
        assert!(init_tracing(&config).is_err());
    }
}
