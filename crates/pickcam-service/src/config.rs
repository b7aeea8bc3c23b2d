//! JSON service configuration.
//!
//! Every field has a default, so a partial file (or none at all) yields a
//! runnable configuration. Defaults match the deployed cell: capture on
//! 9999, commands on 65432, relay toward localhost:12345.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pickcam_color::LocatorParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_stream_port() -> u16 {
    9999
}

/// Capture ingest listener.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_bind_host")]
    pub host: String,
    #[serde(default = "default_stream_port")]
    pub port: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: default_bind_host(),
            port: default_stream_port(),
        }
    }
}

fn default_command_port() -> u16 {
    65432
}

/// JSON command listener.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_bind_host")]
    pub host: String,
    #[serde(default = "default_command_port")]
    pub port: u16,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            host: default_bind_host(),
            port: default_command_port(),
        }
    }
}

fn default_relay_host() -> String {
    "localhost".to_string()
}

fn default_relay_port() -> u16 {
    12345
}

fn default_relay_secret() -> String {
    "1234".to_string()
}

fn default_true() -> bool {
    true
}

fn default_steady_interval_ms() -> u64 {
    20
}

fn default_idle_backoff_ms() -> u64 {
    5_000
}

fn default_error_backoff_ms() -> u64 {
    1_000
}

fn default_ack_timeout_ms() -> u64 {
    500
}

fn default_max_envelope_bytes() -> usize {
    500_000
}

fn default_jpeg_quality() -> u8 {
    60
}

/// Upstream relay target and pacing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_relay_host")]
    pub host: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// Shared secret sent as the first bytes after connecting.
    #[serde(default = "default_relay_secret")]
    pub secret: String,
    /// Pacing between sends while the downstream consumes frames.
    #[serde(default = "default_steady_interval_ms")]
    pub steady_interval_ms: u64,
    /// Pacing once the downstream reports it has no viewers.
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
    /// Pacing after a connect or send failure.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// How long to wait for an acknowledgement line before moving on.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Encoded envelopes above this many bytes are skipped, not sent.
    #[serde(default = "default_max_envelope_bytes")]
    pub max_envelope_bytes: usize,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl RelayConfig {
    pub fn steady_interval(&self) -> Duration {
        Duration::from_millis(self.steady_interval_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_relay_host(),
            port: default_relay_port(),
            secret: default_relay_secret(),
            steady_interval_ms: default_steady_interval_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            max_envelope_bytes: default_max_envelope_bytes(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_calibration_path() -> PathBuf {
    PathBuf::from("marker_origins.json")
}

fn default_tracked_marker_id() -> u32 {
    0
}

/// Top-level service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub stream: StreamConfig,
    pub command: CommandConfig,
    pub relay: RelayConfig,
    #[serde(default = "default_calibration_path")]
    pub calibration_path: PathBuf,
    /// Id of the single reference marker on the work surface.
    #[serde(default = "default_tracked_marker_id")]
    pub tracked_marker_id: u32,
    /// Color locator tunables.
    pub locator: LocatorParams,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            command: CommandConfig::default(),
            relay: RelayConfig::default(),
            calibration_path: default_calibration_path(),
            tracked_marker_id: default_tracked_marker_id(),
            locator: LocatorParams::default(),
        }
    }
}

impl ServiceConfig {
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn stream_addr(&self) -> String {
        format!("{}:{}", self.stream.host, self.stream.port)
    }

    pub fn command_addr(&self) -> String {
        format!("{}:{}", self.command.host, self.command.port)
    }
}
