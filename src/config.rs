//! Bridge configuration
//!
//! Timeouts, retry policy, and host process settings. Values can be loaded
//! from a TOML file; anything omitted falls back to the reference defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Configuration for a [`BridgeClient`](crate::bridge::BridgeClient) and its
/// stdio transport.
///
/// Durations are expressed in milliseconds in the TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host binary to spawn for the stdio transport. When `None`, the
    /// transport falls back to searching for `kiosk-host` in PATH and common
    /// install locations.
    pub host_command: Option<String>,

    /// Extra arguments passed to the host binary.
    pub host_args: Vec<String>,

    /// Bound on the connection handshake.
    pub connect_timeout_ms: u64,

    /// Bound on every individual remote call.
    pub call_timeout_ms: u64,

    /// Interval between health-check probes while connected.
    pub health_interval_ms: u64,

    /// Interval between periodic performance-report emissions.
    pub report_interval_ms: u64,

    /// Maximum automatic reconnection attempts per failure episode.
    pub max_retries: u32,

    /// Base delay for exponential reconnection backoff.
    pub retry_base_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host_command: None,
            host_args: Vec::new(),
            connect_timeout_ms: 10_000,
            call_timeout_ms: 10_000,
            health_interval_ms: 5_000,
            report_interval_ms: 10_000,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

        let config: BridgeConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;

        tracing::debug!("Loaded bridge config from {}", path.display());

        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Backoff delay before reconnection attempt `retry` (1-based):
    /// `base × 2^(retry-1)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.retry_base_delay()
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.health_interval(), Duration::from_secs(5));
        assert_eq!(config.report_interval(), Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
host_command = "/opt/kiosk/host"
host_args = ["--kiosk"]
connect_timeout_ms = 2000
max_retries = 5
"#;

        let config: BridgeConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.host_command.as_deref(), Some("/opt/kiosk/host"));
        assert_eq!(config.host_args, vec!["--kiosk".to_string()]);
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_retries, 5);
        // Omitted keys keep their defaults
        assert_eq!(config.call_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "health_interval_ms = 250").unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.health_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_missing_file() {
        let result = BridgeConfig::load(Path::new("/nonexistent/bridge.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_backoff_doubles() {
        let config = BridgeConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
    }
}
