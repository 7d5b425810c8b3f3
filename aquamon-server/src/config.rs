//! Server configuration loaded from a TOML file.

use std::net::SocketAddr;
use std::path::Path;

use aquamon_engine::EngineSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    /// IANA time zone the ponds operate in, for the night-safety local
    /// hour. Falls back to the host's zone when unset.
    pub timezone: Option<Box<str>>,
    /// Snapshots retained per pond for trend estimation.
    pub history_capacity: usize,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8080".parse().expect("valid literal addr"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            timezone: None,
            history_capacity: 100,
            engine: EngineSettings::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.server.http_addr.port(), 8080);
        assert!(config.engine.trigger_rules.is_empty());
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let config: Config = toml::from_str(
            r#"
            timezone = "Asia/Dhaka"
            history_capacity = 50

            [server]
            http_addr = "0.0.0.0:9000"

            [engine.confidence]
            high = 0.8
            medium = 0.5
            horizon_scale_hours = 24.0
            staleness_scale_hours = 6.0
            disagreement_weight = 2.0
            unmeasured_agreement = 0.85
            "#,
        )
        .unwrap();

        assert_eq!(config.timezone.as_deref(), Some("Asia/Dhaka"));
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.server.http_addr.port(), 9000);
        assert_eq!(config.engine.confidence.high, 0.8);
        // Untouched sections keep their defaults.
        assert_eq!(config.engine.forecast.damping, 0.9);
    }

    #[test]
    fn trigger_rules_deserialize_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [[engine.trigger_rules]]
            actuator = "aerator-1"
            parameter = "DO"
            kind = "Below"
            threshold = 4.0
            confirmations = 3
            cooldown = "PT30M"
            auto_shutoff = "PT2H"
            priority = "High"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.trigger_rules.len(), 1);
        assert_eq!(config.engine.trigger_rules[0].confirmations, 3);
    }
}
