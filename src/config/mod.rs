//! Configuration management
//!
//! Layered: built-in defaults, then an optional TOML file, then environment
//! variables prefixed with `SWITCHLINE` (`SWITCHLINE__REALTIME__WS_URL`).

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub calls: CallsConfig,
    pub messages: MessagesConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub ws_url: String,
    /// Fixed delay between reconnect attempts
    pub reconnect_backoff_ms: u64,
    pub poll_interval_secs: u64,
    /// Capacity of the broadcast channel feeding subscribers
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsConfig {
    /// How long an ended call stays on screen
    pub ended_display_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// How far apart an optimistic send and its confirmation may be stamped
    pub optimistic_match_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8080/api".to_string(),
                request_timeout_secs: 15,
            },
            realtime: RealtimeConfig {
                ws_url: "ws://localhost:8080/realtime".to_string(),
                reconnect_backoff_ms: 3_000,
                poll_interval_secs: 15,
                event_buffer: 256,
            },
            calls: CallsConfig {
                ended_display_ms: 3_000,
            },
            messages: MessagesConfig {
                optimistic_match_window_secs: 120,
            },
            metrics: MetricsConfig {
                enabled: false,
                listen: "127.0.0.1:9100".to_string(),
            },
            logging: LoggingConfig {
                filter: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&Config::default())?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix("SWITCHLINE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize::<Self>()?.validate()
    }

    /// Load from an in-memory TOML document layered over the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&Config::default())?;
        config::Config::builder()
            .add_source(defaults)
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize::<Self>()?
            .validate()
    }

    /// Reject values the runtime cannot work with
    pub fn validate(self) -> Result<Self, config::ConfigError> {
        if self.realtime.poll_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "realtime.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.realtime.event_buffer == 0 {
            return Err(config::ConfigError::Message(
                "realtime.event_buffer must be greater than zero".to_string(),
            ));
        }
        if i64::try_from(self.calls.ended_display_ms).is_err() {
            return Err(config::ConfigError::Message(format!(
                "calls.ended_display_ms is out of range: {}",
                self.calls.ended_display_ms
            )));
        }
        if i64::try_from(self.messages.optimistic_match_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .is_none()
        {
            return Err(config::ConfigError::Message(format!(
                "messages.optimistic_match_window_secs is out of range: {}",
                self.messages.optimistic_match_window_secs
            )));
        }
        Ok(self)
    }
}

impl RealtimeConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl CallsConfig {
    pub fn ended_display(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.ended_display_ms as i64)
    }
}

impl MessagesConfig {
    pub fn optimistic_match_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.optimistic_match_window_secs as i64)
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
