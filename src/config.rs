//! Configuration management for the bridge
//!
//! Configuration is loaded from a JSON file with every field optional, so a
//! partial file only overrides what it names. A missing or malformed file
//! falls back to defaults with a warning; environment variables then take
//! precedence over the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

pub const ENV_HTTP_ADDR: &str = "HOSTBRIDGE_HTTP_ADDR";
pub const ENV_TOKEN: &str = "HOSTBRIDGE_TOKEN";

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub http: HttpConfig,
    pub idle: IdleConfig,
    pub notifications: NotificationConfig,
    pub engine: EngineConfig,
}

/// HTTP control plane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub addr: SocketAddr,
    /// When set, every request must carry this token
    pub token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 2228)),
            token: None,
        }
    }
}

/// Idle pump settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Period between idle ticks in milliseconds
    pub interval_ms: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self { interval_ms: 30 }
    }
}

/// Notification fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Broadcast buffer; listeners further behind than this lag and lose messages
    pub channel_capacity: usize,
    /// Byte budget of one notification line, terminator included
    pub max_line_bytes: usize,
    /// Outstanding file requests awaiting a reply
    pub max_pending_file_requests: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            max_line_bytes: 1024,
            max_pending_file_requests: 16,
        }
    }
}

/// Settings for the built-in engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_plugins: u32,
    pub default_client_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_plugins: 99,
            default_client_name: "hostbridge".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults when the file is missing or invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Apply `HOSTBRIDGE_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENV_HTTP_ADDR) {
            match raw.parse() {
                Ok(addr) => self.http.addr = addr,
                Err(err) => log::warn!(
                    "[Config] Ignoring {}='{}': {}",
                    ENV_HTTP_ADDR,
                    raw,
                    err
                ),
            }
        }
        if let Ok(token) = std::env::var(ENV_TOKEN) {
            if !token.is_empty() {
                self.http.token = Some(token);
            }
        }
        self
    }
}
