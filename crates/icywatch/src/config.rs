//! Configuration for the icywatch poller
//!
//! Constants live in nested modules; [`PollerConfig`] carries the per-instance
//! options a host application supplies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RadioError, Result};

/// Network-related configuration
pub mod network {
    /// Default user agent for HTTP requests
    pub const USER_AGENT: &str = concat!("icywatch/", env!("CARGO_PKG_VERSION"));

    /// Connection timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Read timeout in seconds (applies to each body read, not the whole stream)
    pub const READ_TIMEOUT_SECS: u64 = 30;

    /// Request header asking the server to interleave metadata
    pub const ICY_METADATA_HEADER: &str = "Icy-MetaData";
}

/// Polling defaults
pub mod poll {
    /// Seconds before reconnecting after a metadata-bearing cycle
    pub const METADATA_INTERVAL_SECS: u64 = 5;

    /// Seconds before retrying when the server sent no `icy-metaint` header
    pub const EMPTY_INTERVAL_SECS: u64 = 300;

    /// Seconds before retrying after a transport error
    pub const ERROR_INTERVAL_SECS: u64 = 10;
}

/// Demuxer configuration
pub mod demux {
    /// Metadata length byte is multiplied by this
    pub const METADATA_BLOCK_UNIT: usize = 16;

    /// Chunk size for reads from the response body (bytes)
    pub const READ_CHUNK_SIZE: usize = 8 * 1024;

    /// Audio chunks buffered for an [`AudioStream`](crate::stream::AudioStream) consumer
    pub const AUDIO_CHANNEL_BOUND: usize = 32;
}

/// Options for an [`IcyPoller`](crate::poller::IcyPoller).
///
/// Deserializes from camelCase keys (`userAgent`, `keepListen`, ...); interval
/// fields are whole seconds. Every field except `url` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollerConfig {
    pub url: String,
    pub user_agent: String,
    pub auto_update: bool,
    pub keep_listen: bool,
    pub notify_on_change_only: bool,
    pub metadata_interval: u64,
    pub empty_interval: u64,
    pub error_interval: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user_agent: network::USER_AGENT.to_string(),
            auto_update: true,
            keep_listen: false,
            notify_on_change_only: true,
            metadata_interval: poll::METADATA_INTERVAL_SECS,
            empty_interval: poll::EMPTY_INTERVAL_SECS,
            error_interval: poll::ERROR_INTERVAL_SECS,
        }
    }
}

impl PollerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_auto_update(mut self, enabled: bool) -> Self {
        self.auto_update = enabled;
        self
    }

    pub fn with_keep_listen(mut self, enabled: bool) -> Self {
        self.keep_listen = enabled;
        self
    }

    pub fn with_notify_on_change_only(mut self, enabled: bool) -> Self {
        self.notify_on_change_only = enabled;
        self
    }

    pub fn with_metadata_interval(mut self, secs: u64) -> Self {
        self.metadata_interval = secs;
        self
    }

    pub fn with_empty_interval(mut self, secs: u64) -> Self {
        self.empty_interval = secs;
        self
    }

    pub fn with_error_interval(mut self, secs: u64) -> Self {
        self.error_interval = secs;
        self
    }

    pub fn metadata_delay(&self) -> Duration {
        Duration::from_secs(self.metadata_interval)
    }

    pub fn empty_delay(&self) -> Duration {
        Duration::from_secs(self.empty_interval)
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_secs(self.error_interval)
    }

    /// Check the URL and intervals. Called by the poller before it accepts a
    /// configuration, so a bad value never reaches the worker.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(RadioError::Config("url is required".to_string()));
        }
        let url = url::Url::parse(&self.url)?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(RadioError::Config(format!(
                    "Unsupported URL scheme: {other}"
                )))
            }
        }
        if self.user_agent.trim().is_empty() {
            return Err(RadioError::Config("userAgent must not be empty".to_string()));
        }
        for (name, secs) in [
            ("metadataInterval", self.metadata_interval),
            ("emptyInterval", self.empty_interval),
            ("errorInterval", self.error_interval),
        ] {
            if secs == 0 {
                return Err(RadioError::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}
