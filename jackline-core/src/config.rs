//! Session configuration (JSON file or built in code).

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JacklineError, Result};

/// Most input ports a session may register.
pub const MAX_CHANNELS: u16 = 8;

const DEFAULT_IDLE_POLL_MS: u64 = 20;
const IDLE_POLL_ENV: &str = "JACKLINE_IDLE_POLL_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct BridgeConfig {
    /// Client name announced to the audio server.
    pub client_name: String,
    /// Number of input ports (`in_1 .. in_N`), 1..=8.
    pub channels: u16,
    /// Ask the host to start the audio server if none is running.
    pub start_server: bool,
    /// Input device hint for drivers that pick a device (cpal).
    pub preferred_device: Option<String>,
    /// Requested block size for drivers that let us choose it.
    pub block_frames: Option<u32>,
    /// Transfer loop sleep when the ring is empty, in ms.
    pub idle_poll_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            client_name: "jackline".into(),
            channels: 2,
            start_server: false,
            preferred_device: None,
            block_frames: None,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
        }
    }
}

impl BridgeConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let mut config: BridgeConfig = serde_json::from_str(&raw)
            .map_err(|e| JacklineError::InvalidConfig(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    /// Trim free-text fields and drop empty optionals.
    pub fn normalize(&mut self) {
        self.client_name = self.client_name.trim().to_string();
        self.preferred_device = self
            .preferred_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_name.trim().is_empty() {
            return Err(JacklineError::InvalidConfig(
                "client name must not be empty".into(),
            ));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(JacklineError::InvalidConfig(format!(
                "channels must be 1..={MAX_CHANNELS}, got {}",
                self.channels
            )));
        }
        if self.block_frames == Some(0) {
            return Err(JacklineError::InvalidConfig(
                "block size must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.idle_poll_ms) {
            return Err(JacklineError::InvalidConfig(format!(
                "idle poll must be 1..=100 ms, got {}",
                self.idle_poll_ms
            )));
        }
        Ok(())
    }

    /// Idle sleep for the transfer loop; `JACKLINE_IDLE_POLL_MS` wins if set.
    pub fn idle_poll(&self) -> Duration {
        let ms = std::env::var(IDLE_POLL_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(1, 100))
            .unwrap_or(self.idle_poll_ms);
        Duration::from_millis(ms)
    }

    /// Port names registered with the host, in channel order.
    pub fn port_names(&self) -> impl Iterator<Item = String> {
        (1..=self.channels).map(|i| format!("in_{i}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_stereo() {
        let config = BridgeConfig::default();
        config.validate().unwrap();
        assert_eq!(
            config.port_names().collect::<Vec<_>>(),
            vec!["in_1".to_string(), "in_2".to_string()]
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = [
            BridgeConfig {
                channels: 0,
                ..Default::default()
            },
            BridgeConfig {
                channels: 9,
                ..Default::default()
            },
            BridgeConfig {
                client_name: "  ".into(),
                ..Default::default()
            },
            BridgeConfig {
                block_frames: Some(0),
                ..Default::default()
            },
            BridgeConfig {
                idle_poll_ms: 0,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(JacklineError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn loads_partial_json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jackline.json");
        fs::write(
            &path,
            r#"{ "clientName": " obs ", "channels": 6, "preferredDevice": "  " }"#,
        )
        .unwrap();

        let config = BridgeConfig::from_json_file(&path).unwrap();
        assert_eq!(config.client_name, "obs");
        assert_eq!(config.channels, 6);
        assert_eq!(config.preferred_device, None);
        assert_eq!(config.idle_poll_ms, 20);
        assert!(!config.start_server);
    }

    #[test]
    fn malformed_json_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ channels: ").unwrap();
        assert!(matches!(
            BridgeConfig::from_json_file(&path),
            Err(JacklineError::InvalidConfig(_))
        ));
    }
}
