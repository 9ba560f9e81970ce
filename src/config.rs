//! Engine Configuration
//!
//! Loads engine settings from YAML. Missing fields take the engine defaults,
//! so an empty document is a valid configuration.
//!
//! ```yaml
//! max_retries: 5
//! retry_delay_ms: 250
//! ```

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings as read from a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Total attempts per task body, including the first
    pub max_retries: u32,
    /// Wait between attempts, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl EngineConfig {
    /// Checks that the settings can drive an engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_retries must be at least 1 (it counts the first attempt)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses and validates a configuration from a YAML string.
pub fn parse_config(yaml: &str) -> Result<EngineConfig, ConfigError> {
    // serde_yaml treats an empty document as null, not as an empty mapping.
    let config: EngineConfig = if yaml.trim().is_empty() {
        EngineConfig::default()
    } else {
        serde_yaml::from_str(yaml)?
    };

    config.validate()?;
    debug!("Parsed engine config: {:?}", config);
    Ok(config)
}

/// Loads and validates a configuration file.
///
/// # Example
///
/// ```rust,no_run
/// use taskgraph::{load_config, Engine};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("engine.yaml")?;
///     let engine = Engine::from_config(config);
///     println!("{:?}", engine.retry_policy());
///     Ok(())
/// }
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading engine config from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_config("max_retries: 5\nretry_delay_ms: 250\n").unwrap();
        assert_eq!(
            config,
            EngineConfig {
                max_retries: 5,
                retry_delay_ms: 250
            }
        );
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = parse_config("retry_delay_ms: 10").unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 10);

        assert_eq!(parse_config("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let err = parse_config("max_retries: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = parse_config("max_retries: [not, a, number]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_retries: 2").unwrap();
        writeln!(file, "retry_delay_ms: 50").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay_ms, 50);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");

        let err = load_config(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("absent.yaml"));
    }
}
