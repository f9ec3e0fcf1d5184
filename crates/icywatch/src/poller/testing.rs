//! Scripted connector for poller tests

use std::collections::VecDeque;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::demux::METADATA_BLOCK_UNIT;
use crate::error::{RadioError, Result};
use crate::stream::{Connector, IcyHeaders, MetadataBlock, StreamRequest, StreamResponse};

/// One scripted outcome of `connect`
pub(crate) enum Script {
    Fail,
    Respond { metaint: Option<i64>, body: Vec<u8> },
    /// Serves `body`, then fails with a connection reset
    Broken { metaint: Option<i64>, body: Vec<u8> },
}

impl Script {
    pub fn respond(metaint: Option<i64>, body: Vec<u8>) -> Self {
        Script::Respond { metaint, body }
    }

    pub fn broken(metaint: Option<i64>, body: Vec<u8>) -> Self {
        Script::Broken { metaint, body }
    }
}

/// Plays back scripts in order; fails once they run out.
pub(crate) struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    requests: Arc<AtomicUsize>,
    served: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Arc::new(AtomicUsize::new(0)),
            served: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `connect` calls
    pub fn request_counter(&self) -> Arc<AtomicUsize> {
        self.requests.clone()
    }

    /// Shared counter of body bytes handed to the reader
    pub fn bytes_served(&self) -> Arc<AtomicUsize> {
        self.served.clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _request: &StreamRequest) -> Result<StreamResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();

        let (metaint, body): (Option<i64>, Box<dyn Read + Send>) = match script {
            None | Some(Script::Fail) => {
                return Err(RadioError::Stream("scripted failure".to_string()))
            }
            Some(Script::Respond { metaint, body }) => (metaint, Box::new(Cursor::new(body))),
            Some(Script::Broken { metaint, body }) => (
                metaint,
                Box::new(Cursor::new(body).chain(ResetReader)),
            ),
        };

        Ok(StreamResponse {
            headers: IcyHeaders {
                metaint,
                ..IcyHeaders::default()
            },
            body: Box::new(CountingReader {
                inner: body,
                served: self.served.clone(),
            }),
        })
    }
}

struct CountingReader {
    inner: Box<dyn Read + Send>,
    served: Arc<AtomicUsize>,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.served.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }
}

struct ResetReader;

impl Read for ResetReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
    }
}

/// Encode one ICY cycle per entry of `metas`. Audio of cycle `i` is
/// `metaint` bytes of value `i + 1`; an empty text gives L = 0.
pub(crate) fn icy_body(metaint: usize, metas: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, meta) in metas.iter().enumerate() {
        out.extend(std::iter::repeat(i as u8 + 1).take(metaint));
        let blocks = meta.len().div_ceil(METADATA_BLOCK_UNIT);
        out.push(blocks as u8);
        let mut text = meta.as_bytes().to_vec();
        text.resize(blocks * METADATA_BLOCK_UNIT, 0);
        out.extend_from_slice(&text);
    }
    out
}

pub(crate) fn title(t: &str) -> MetadataBlock {
    [("StreamTitle", t)].into_iter().collect()
}
