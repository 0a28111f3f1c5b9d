//! Server configuration
//!
//! Loaded with [`mediagraph_infra_common::load_config`]: built-in defaults,
//! then an optional TOML file, then `MEDIAGRAPH__<SECTION>__<KEY>`
//! environment variables.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use mediagraph_infra_common::{load_config, ConfigSource, InfraResult, LoggingConfig};
use mediagraph_object_core::LoopbackConfig;
use serde::{Deserialize, Serialize};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "MEDIAGRAPH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address the RPC listener binds to
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcSection {
    pub enabled: bool,
    /// Seconds between sweeps
    pub interval_secs: u64,
}

impl Default for GcSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
        }
    }
}

impl GcSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Loopback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub kind: EngineKind,
    pub media_address: String,
    pub base_port: u16,
}

impl Default for EngineSection {
    fn default() -> Self {
        let loopback = LoopbackConfig::default();
        Self {
            kind: EngineKind::Loopback,
            media_address: loopback.media_address,
            base_port: loopback.base_port,
        }
    }
}

impl EngineSection {
    pub fn loopback(&self) -> LoopbackConfig {
        LoopbackConfig {
            media_address: self.media_address.clone(),
            base_port: self.base_port,
        }
    }
}

/// Complete configuration of the `mediagraph` binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub gc: GcSection,
    pub engine: EngineSection,
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Load from `path` if given, otherwise from defaults and the environment
    pub fn load(path: Option<&Path>) -> InfraResult<Self> {
        let source = match path {
            Some(path) => ConfigSource::File(path),
            None => ConfigSource::Defaults,
        };
        load_config(source, ENV_PREFIX)
    }

    /// Parse an inline TOML document, without the environment layer
    pub fn from_toml(document: &str) -> InfraResult<Self> {
        load_config(ConfigSource::Inline(document), "")
    }

    pub fn bind_addr(&self) -> InfraResult<SocketAddr> {
        self.server.bind.parse().map_err(|e| {
            mediagraph_infra_common::InfraError::config(format!(
                "invalid bind address {}: {}",
                self.server.bind, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr().unwrap().port(), 9090);
        assert_eq!(config.gc.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            [server]
            bind = "0.0.0.0:8888"

            [gc]
            enabled = false
            interval_secs = 0

            [engine]
            kind = "loopback"
            base_port = 30000

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8888");
        assert!(!config.gc.enabled);
        assert_eq!(config.gc.interval(), Duration::from_secs(1));
        assert_eq!(config.engine.loopback().base_port, 30000);
        assert_eq!(config.engine.media_address, "127.0.0.1");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = \"127.0.0.1:7000\"").unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 7000);
    }

    #[test]
    fn test_invalid_bind_address() {
        let config = ServerConfig::from_toml("[server]\nbind = \"nowhere\"").unwrap();
        assert!(config.bind_addr().is_err());
    }
}
