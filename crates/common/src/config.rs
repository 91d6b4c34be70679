use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

/// Top-level process configuration, loaded from TOML with environment
/// overrides for secrets (grounded on the teacher's `SystemConfig::load`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub gateway: GatewayConfig,
    pub evaluator: EvaluatorConfig,
    pub dispatcher: DispatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn default_max_connections() -> u32 {
        10
    }
}

/// Selects between the in-process and Redis-backed broker (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// When absent, the in-process single-replica broker is used.
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "GatewayConfig::default_path")]
    pub ws_path: String,
    #[serde(default = "GatewayConfig::default_keep_alive_ms")]
    pub keep_alive_ms: u64,
}

impl GatewayConfig {
    fn default_path() -> String {
        "/ws".to_string()
    }

    fn default_keep_alive_ms() -> u64 {
        30_000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default = "EvaluatorConfig::default_tick_ms")]
    pub tick_ms: u64,
}

impl EvaluatorConfig {
    fn default_tick_ms() -> u64 {
        60_000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "DispatcherConfig::default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "DispatcherConfig::default_user_agent")]
    pub user_agent: String,
}

impl DispatcherConfig {
    fn default_http_timeout_ms() -> u64 {
        10_000
    }

    fn default_user_agent() -> String {
        "fleet-console/1.0".to_string()
    }
}

impl FleetConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: FleetConfig =
            toml::from_str(&content).map_err(|e| FleetError::Config(e.to_string()))?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.broker.redis_url = Some(url);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
port = 9090

[database]
url = "postgres://localhost/fleet"

[broker]

[gateway]

[evaluator]

[dispatcher]
"#,
        )
        .unwrap();

        let config = FleetConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.gateway.ws_path, "/ws");
        assert_eq!(config.evaluator.tick_ms, 60_000);
        assert!(config.broker.redis_url.is_none());
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "not valid toml {{{").unwrap();
        assert!(FleetConfig::load(path.to_str().unwrap()).is_err());
    }
}
