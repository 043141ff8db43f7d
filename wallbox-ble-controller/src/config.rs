//! Engine configuration
//!
//! Every field is optional in JSON; missing fields take the defaults the
//! charger protocol was designed around.

use std::path::Path;
use std::time::Duration;

use wallbox_proto::assembler::DEFAULT_BUFFER_LIMIT;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound on a single GATT write
    pub write_timeout_ms: u64,
    /// Bound on waiting for the matching response after the write
    pub response_timeout_ms: u64,
    /// Pause between a lost (or failed) connection and the next attempt
    pub reconnect_delay_ms: u64,
    /// Inbound bytes kept while waiting for a response to parse
    pub max_inbound_buffer: usize,
    /// Status refresh period of the poller
    pub poll_interval_ms: u64,
    /// How long to scan when the charger is not yet known to the adapter
    pub scan_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 2000,
            response_timeout_ms: 2000,
            reconnect_delay_ms: 1000,
            max_inbound_buffer: DEFAULT_BUFFER_LIMIT,
            poll_interval_ms: 10_000,
            scan_timeout_ms: 5000,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: String, source: serde_json::Error },
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"response_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.response_timeout_ms, 500);
        assert_eq!(config.write_timeout_ms, 2000);
        assert_eq!(config.reconnect_delay_ms, 1000);
        assert_eq!(config.max_inbound_buffer, 4096);
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("wallbox-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"poll_interval_ms": 30000}"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.poll_interval().as_secs(), 30);

        assert!(EngineConfig::load(&path).is_err());
    }
}
