//! Poller notifications

use std::time::{Duration, Instant};

use crate::config::PollerConfig;
use crate::error::RadioError;
use crate::stream::{AudioStream, IcyHeaders, MetadataBlock};

/// Notifications published by an [`IcyPoller`](super::IcyPoller), in the
/// order they happen.
#[derive(Debug)]
pub enum PollerEvent {
    /// A metadata-carrying response was opened; audio is readable from the handle.
    Stream(StreamHandle),
    /// A decoded metadata block (subject to change-only filtering)
    Metadata(MetadataBlock),
    /// The server answered without `icy-metaint`
    Empty,
    /// Transport failure; a retry has been scheduled if auto-update is on
    Error(RadioError),
    /// The server closed a keep-listen connection
    End,
}

/// Payload of [`PollerEvent::Stream`]
#[derive(Debug)]
pub struct StreamHandle {
    pub headers: IcyHeaders,
    pub audio: AudioStream,
}

/// Messages from the handle to the worker thread
#[derive(Debug)]
pub(crate) enum Command {
    Start,
    Stop,
    UpdateConfig(Box<PollerConfig>),
    Shutdown,
}

/// The single outstanding scheduled request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingRequest {
    pub deadline: Instant,
    pub delay: Duration,
    /// Bumped on every schedule, so a replaced timer is distinguishable
    pub generation: u64,
}
