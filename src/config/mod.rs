// src/config/mod.rs
mod models;

pub use models::*;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("backend list is empty")]
    NoBackends,

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await?;

    let ext = path.extension().and_then(|s| s.to_str());
    let config: Config = if matches!(ext, Some("yaml") | Some("yml")) {
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?
    } else {
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_with_defaults() {
        let yaml = r#"
listen_addr: "127.0.0.1:8080"
backends:
  - url: "http://127.0.0.1:4001"
  - url: "http://127.0.0.1:4002"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].url.as_str(), "http://127.0.0.1:4001/");
        assert_eq!(config.health_check.interval_secs, 10);
        assert_eq!(config.health_check.path, "/health");
        assert_eq!(config.forward_timeout_secs, 30);
    }

    #[test]
    fn rejects_empty_backend_list() {
        let yaml = r#"
listen_addr: "127.0.0.1:8080"
backends: []
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoBackends)));
    }

    #[test]
    fn rejects_unparsable_backend_address() {
        let yaml = r#"
listen_addr: "127.0.0.1:8080"
backends:
  - url: "not a url"
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn rejects_zero_probe_interval() {
        let yaml = r#"
listen_addr: "127.0.0.1:8080"
backends:
  - url: "http://127.0.0.1:4001"
health_check:
  interval_secs: 0
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }
}
