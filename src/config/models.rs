// src/config/models.rs
use super::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the load balancer listens on, e.g. "0.0.0.0:8080".
    pub listen_addr: SocketAddr,

    /// Ordered backend list; selection order follows this order.
    pub backends: Vec<BackendConfig>,

    /// Deadline for a forwarded request to produce response headers.
    #[serde(default = "default_forward_timeout_secs")]
    pub forward_timeout_secs: u64,

    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: Url,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Path probed on every backend, e.g. "/health".
    #[serde(default = "default_path")]
    pub path: String,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        if self.forward_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "forward_timeout_secs must be greater than zero".to_string(),
            ));
        }
        self.health_check.validate()
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }
}

impl HealthCheckConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "health_check.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "health_check.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            path: default_path(),
        }
    }
}

fn default_forward_timeout_secs() -> u64 {
    30
}

fn default_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_path() -> String {
    "/health".to_string()
}
