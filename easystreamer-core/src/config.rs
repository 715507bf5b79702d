use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub webrtc: WebRTCConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
    /// Select every stream the server flags `default` once the catalog arrives
    pub auto_select_defaults: bool,
}

/// Where the streaming server lives and how patiently to talk to it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:80".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

/// WebRTC configuration for the receiving peer connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRTCConfig {
    /// STUN server URLs for ICE candidate discovery
    pub stun_servers: Vec<String>,
    /// Upper bound on waiting for ICE gathering before an offer is sent
    pub ice_gathering_timeout_ms: u64,
    /// A track with no RTP for this long is considered muted
    pub mute_timeout_ms: u64,
}

impl Default for WebRTCConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            ice_gathering_timeout_ms: 5000,
            mute_timeout_ms: 1500,
        }
    }
}

impl WebRTCConfig {
    #[must_use]
    pub const fn ice_gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_gathering_timeout_ms)
    }

    #[must_use]
    pub const fn mute_timeout(&self) -> Duration {
        Duration::from_millis(self.mute_timeout_ms)
    }
}

/// Polling cadence for `/api/streams` and `/api/stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub streams_poll_interval_ms: u64,
    pub stats_poll_interval_ms: u64,
    pub poll_stats: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            streams_poll_interval_ms: 1000,
            stats_poll_interval_ms: 1000,
            poll_stats: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // EASYSTREAMER_SERVER__BASE_URL, EASYSTREAMER_WEBRTC__MUTE_TIMEOUT_MS, ...
        builder = builder.add_source(
            Environment::with_prefix("EASYSTREAMER")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("webrtc.stun_servers")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check the configuration for values the client cannot run with
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.server.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!(
                "server.base_url must be http or https, got scheme '{}'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("server.base_url is not a valid URL: {e}")),
        }

        if self.server.request_timeout_secs == 0 {
            errors.push("server.request_timeout_secs must be greater than 0".to_string());
        }
        if self.catalog.streams_poll_interval_ms == 0 {
            errors.push("catalog.streams_poll_interval_ms must be greater than 0".to_string());
        }
        if self.catalog.poll_stats && self.catalog.stats_poll_interval_ms == 0 {
            errors.push("catalog.stats_poll_interval_ms must be greater than 0".to_string());
        }
        if self.webrtc.mute_timeout_ms == 0 {
            errors.push("webrtc.mute_timeout_ms must be greater than 0".to_string());
        }
        for server in &self.webrtc.stun_servers {
            if !server.starts_with("stun:") && !server.starts_with("stuns:") {
                errors.push(format!("webrtc.stun_servers entry '{server}' is not a stun: URL"));
            }
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.catalog.streams_poll_interval_ms)
    }

    #[must_use]
    pub const fn stats_poll_interval(&self) -> Duration {
        Duration::from_millis(self.catalog.stats_poll_interval_ms)
    }
}
