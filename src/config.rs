//! Bridge configuration.
//!
//! Every field has a default, so an empty JSON object (or an empty
//! environment) yields a working config pointed at `/tmp/sidecar.sock`.
//!
//! ```
//! use sidecar_bridge::BridgeConfig;
//!
//! let config = BridgeConfig::from_json_str(r#"{"socket_address": "/run/worker.sock", "connections": 4}"#).unwrap();
//! assert_eq!(config.connections, 4);
//! assert_eq!(config.call_timeout(), None);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::{ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_PENDING_FRAMES};

pub const DEFAULT_SOCKET_ADDRESS: &str = "/tmp/sidecar.sock";

pub const ENV_SOCKET_ADDRESS: &str = "SIDECAR_SOCKET_ADDRESS";
pub const ENV_CONNECTIONS: &str = "SIDECAR_CONNECTIONS";
pub const ENV_CALL_TIMEOUT_MS: &str = "SIDECAR_CALL_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Unix socket path the worker listens on.
    pub socket_address: String,
    /// Physical connections opened to the worker.
    pub connections: usize,
    /// Default per-call timeout. `None` waits until the reply or the
    /// connection closes.
    pub call_timeout_ms: Option<u64>,
    pub max_payload_size: u32,
    pub max_pending_frames: usize,
    pub channel_capacity: usize,
    pub backpressure_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_address: DEFAULT_SOCKET_ADDRESS.to_string(),
            connections: 1,
            call_timeout_ms: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout_ms: 5_000,
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SIDECAR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(address) = lookup(ENV_SOCKET_ADDRESS) {
            config.socket_address = address;
        }
        if let Some(raw) = lookup(ENV_CONNECTIONS) {
            config.connections = parse_env(ENV_CONNECTIONS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CALL_TIMEOUT_MS) {
            config.call_timeout_ms = Some(parse_env(ENV_CALL_TIMEOUT_MS, &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.socket_address.is_empty() {
            return Err(BridgeError::Config("socket_address must not be empty".to_string()));
        }
        if self.connections == 0 {
            return Err(BridgeError::Config("connections must be at least 1".to_string()));
        }
        if self.max_payload_size == 0 || self.max_payload_size > ABSOLUTE_MAX_PAYLOAD_SIZE {
            return Err(BridgeError::Config(format!(
                "max_payload_size must be between 1 and {ABSOLUTE_MAX_PAYLOAD_SIZE}"
            )));
        }
        if self.max_pending_frames == 0 || self.channel_capacity == 0 {
            return Err(BridgeError::Config(
                "max_pending_frames and channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_frames: self.max_pending_frames,
            channel_capacity: self.channel_capacity,
            backpressure_timeout: Duration::from_millis(self.backpressure_timeout_ms),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_payload_size: self.max_payload_size,
            writer: self.writer_config(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| BridgeError::Config(format!("{key}: cannot parse {raw:?}")))
}
