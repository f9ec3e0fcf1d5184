//! ICY transport
//!
//! Issues the `Icy-MetaData: 1` request, parses the `icy-*` response headers,
//! and provides the [`AudioStream`] handle through which demuxed audio is
//! handed to a consumer.

use std::io::{self, Read};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use reqwest::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};

use crate::config::demux::AUDIO_CHANNEL_BOUND;
use crate::config::network::{CONNECT_TIMEOUT_SECS, ICY_METADATA_HEADER, READ_TIMEOUT_SECS};
use crate::config::PollerConfig;
use crate::error::{RadioError, Result};

/// Headers parsed from an ICY stream response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcyHeaders {
    /// Raw `icy-metaint` value. `None` when the header is missing or not a
    /// number, meaning the server will not interleave metadata.
    pub metaint: Option<i64>,
    pub station_name: Option<String>,
    pub genre: Option<String>,
    pub content_type: Option<String>,
    pub bitrate: Option<u32>,
}

impl IcyHeaders {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        Self {
            metaint: text("icy-metaint").and_then(|v| v.parse::<i64>().ok()),
            station_name: text("icy-name"),
            genre: text("icy-genre"),
            content_type: text(CONTENT_TYPE.as_str()),
            bitrate: text("icy-br").and_then(|v| v.parse::<u32>().ok()),
        }
    }
}

/// What the poller asks a [`Connector`] to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub url: String,
    pub user_agent: String,
}

impl StreamRequest {
    pub fn from_config(config: &PollerConfig) -> Self {
        Self {
            url: config.url.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// An open response: parsed headers plus the body as a byte reader.
///
/// Dropping the response releases the underlying connection.
pub struct StreamResponse {
    pub headers: IcyHeaders,
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// HTTP transport used by the poller. Redirects, TLS and timeouts are the
/// implementation's business; any failure is reported as an error.
pub trait Connector: Send + 'static {
    fn connect(&self, request: &StreamRequest) -> Result<StreamResponse>;
}

/// [`Connector`] backed by `reqwest::blocking`
pub struct HttpConnector {
    client: reqwest::blocking::Client,
}

impl HttpConnector {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

impl Connector for HttpConnector {
    fn connect(&self, request: &StreamRequest) -> Result<StreamResponse> {
        let response = self
            .client
            .get(&request.url)
            .header(ICY_METADATA_HEADER, "1")
            .header(USER_AGENT, &request.user_agent)
            .send()?;

        if !response.status().is_success() {
            return Err(RadioError::Stream(format!("HTTP {}", response.status())));
        }

        let headers = IcyHeaders::from_header_map(response.headers());
        Ok(StreamResponse {
            headers,
            body: Box::new(response),
        })
    }
}

/// Live audio of one demuxed response.
///
/// Reads return audio bytes with metadata removed, in stream order. Reading
/// returns `Ok(0)` once the response has been released or has ended.
/// Dropping the handle stops audio forwarding for the session; metadata keeps
/// flowing. A handle that is kept but never read applies backpressure to the
/// poller once its buffer fills.
pub struct AudioStream {
    current_chunk: Vec<u8>,
    chunk_pos: usize,
    receiver: Receiver<Vec<u8>>,
}

impl AudioStream {
    pub(crate) fn channel() -> (Sender<Vec<u8>>, Self) {
        let (tx, rx) = bounded::<Vec<u8>>(AUDIO_CHANNEL_BOUND);
        (
            tx,
            Self {
                current_chunk: Vec::new(),
                chunk_pos: 0,
                receiver: rx,
            },
        )
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("buffered", &(self.current_chunk.len() - self.chunk_pos))
            .field("queued_chunks", &self.receiver.len())
            .finish()
    }
}

impl Read for AudioStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            // Serve from current chunk
            let remaining = self.current_chunk.len() - self.chunk_pos;
            if remaining > 0 {
                let n = buf.len().min(remaining);
                buf[..n].copy_from_slice(&self.current_chunk[self.chunk_pos..self.chunk_pos + n]);
                self.chunk_pos += n;
                if self.chunk_pos >= self.current_chunk.len() {
                    self.current_chunk = Vec::new();
                    self.chunk_pos = 0;
                }
                return Ok(n);
            }

            match self.receiver.recv() {
                Ok(chunk) => {
                    self.current_chunk = chunk;
                    self.chunk_pos = 0;
                }
                // Session released or ended
                Err(_) => return Ok(0),
            }
        }
    }
}
