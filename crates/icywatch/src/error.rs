//! Error types for icywatch
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the demuxer and poller
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("{}", friendly_network_error(.0))]
    Network(#[from] reqwest::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid metadata interval: {0} (must be positive)")]
    InvalidMetaInterval(i64),
}

impl From<url::ParseError> for RadioError {
    fn from(e: url::ParseError) -> Self {
        RadioError::Config(format!("Invalid URL: {e}"))
    }
}

/// Result type alias for icywatch
pub type Result<T> = std::result::Result<T, RadioError>;

fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if e.is_status() {
        if let Some(status) = e.status() {
            return format!("Server responded with HTTP {status}");
        }
    }
    format!("Network error: {e}")
}
