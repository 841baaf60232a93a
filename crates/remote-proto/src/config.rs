use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Where the client finds the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "platform::default_base_url")]
    pub base_url: String,
    #[serde(default = "default_event_path")]
    pub event_path: String,
}

/// Event feed reconnection and framing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Give up after this many consecutive failed connections.  Absent means
    /// retry forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Largest amount of buffered bytes without a newline before the
    /// connection is dropped.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

/// The property that is fetched on a timer instead of pushed over the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_property")]
    pub property: String,
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// mpv `--input-ipc-server` path (unix socket or named pipe).
    #[serde(default = "platform::mpv_ipc_path")]
    pub ipc_socket: String,
    #[serde(default = "default_allowed_properties")]
    pub allowed_properties: Vec<String>,
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    /// Properties whose writes are echoed on mpv's OSD.
    #[serde(default = "default_osd_properties")]
    pub osd_properties: Vec<String>,
    /// Properties pushed over `/event` via `observe_property`.
    #[serde(default = "default_observed_properties")]
    pub observed_properties: Vec<String>,
    #[serde(default = "default_cors")]
    pub cors: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: platform::default_base_url(),
            event_path: default_event_path(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: None,
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            property: default_poll_property(),
            interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            ipc_socket: platform::mpv_ipc_path(),
            allowed_properties: default_allowed_properties(),
            allowed_commands: default_allowed_commands(),
            osd_properties: default_osd_properties(),
            observed_properties: default_observed_properties(),
            cors: default_cors(),
        }
    }
}

impl StreamConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_event_path() -> String {
    crate::protocol::EVENT_PATH.to_string()
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_max_frame_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_poll_property() -> String {
    "time-pos".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DEFAULT_BRIDGE_PORT
}

fn default_cors() -> bool {
    true
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_allowed_properties() -> Vec<String> {
    strings(&[
        "aid",
        "duration",
        "mute",
        "pause",
        "playlist",
        "sid",
        "speed",
        "time-pos",
        "track-list",
        "volume-max",
        "volume",
    ])
}

fn default_allowed_commands() -> Vec<String> {
    strings(&["add", "multiply", "playlist-play-index", "seek"])
}

fn default_osd_properties() -> Vec<String> {
    strings(&["mute", "volume"])
}

fn default_observed_properties() -> Vec<String> {
    // time-pos is deliberately absent: it is polled
    strings(&[
        "duration",
        "mute",
        "pause",
        "playlist",
        "track-list",
        "volume",
        "volume-max",
    ])
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
