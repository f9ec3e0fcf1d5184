//! ICY metadata poller
//!
//! Drives repeated requests against one stream URL and turns the outcomes
//! into [`PollerEvent`]s. All state lives on a dedicated worker thread; the
//! [`IcyPoller`] handle only sends it commands.
//!
//! Cycle outcomes and what gets scheduled next:
//!
//! | outcome | event | next request after |
//! |---|---|---|
//! | transport error | `Error` | `errorInterval` |
//! | no `icy-metaint` | `Empty` | `emptyInterval` |
//! | first metadata block | `Stream`, `Metadata` | `metadataInterval` |
//! | server closes before the first block | `Stream` only | `errorInterval` |
//!
//! With `keepListen` the response is never released and no second request is
//! ever scheduled, whatever the outcome; `End` is published when the server
//! closes the connection.
//! With `autoUpdate` off nothing is ever scheduled; call
//! [`IcyPoller::start`] to poll again.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::config::PollerConfig;
use crate::error::Result;
use crate::stream::{Connector, HttpConnector};

mod types;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use types::{PollerEvent, StreamHandle};

use types::Command;
use worker::PollerWorker;

/// Handle to a running poller.
///
/// Dropping the handle stops the worker. A worker blocked on a network read
/// exits once that read returns.
pub struct IcyPoller {
    control: Sender<Command>,
    _handle: Option<JoinHandle<()>>,
}

impl IcyPoller {
    /// Validate `config` and start an idle worker using `connector`.
    ///
    /// Returns the handle and the receiver all events are published on. No
    /// request is made until [`start`](Self::start) is called.
    pub fn spawn<C: Connector>(
        config: PollerConfig,
        connector: C,
    ) -> Result<(Self, Receiver<PollerEvent>)> {
        config.validate()?;

        let (events_tx, events_rx) = unbounded::<PollerEvent>();
        let (control_tx, control_rx) = unbounded::<Command>();

        let worker = PollerWorker::new(config, connector, events_tx, control_rx);
        let handle = thread::Builder::new()
            .name("icy-poller".to_string())
            .spawn(move || worker.run())?;

        Ok((
            Self {
                control: control_tx,
                _handle: Some(handle),
            },
            events_rx,
        ))
    }

    /// [`spawn`](Self::spawn) with the default HTTP connector.
    pub fn connect(config: PollerConfig) -> Result<(Self, Receiver<PollerEvent>)> {
        Self::spawn(config, HttpConnector::new()?)
    }

    /// Request now. Any pending scheduled request is cancelled and a live
    /// response is released first.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Cancel the pending request and release any live response. Calling it
    /// while idle is a no-op.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Replace the configuration. Takes effect for the next decision the
    /// worker makes; an invalid configuration is rejected here.
    pub fn update_config(&self, config: PollerConfig) -> Result<()> {
        config.validate()?;
        self.send(Command::UpdateConfig(Box::new(config)));
        Ok(())
    }

    fn send(&self, cmd: Command) {
        if self.control.send(cmd).is_err() {
            debug!("poller worker already stopped");
        }
    }
}

impl Drop for IcyPoller {
    fn drop(&mut self) {
        let _ = self.control.send(Command::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RadioError;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    use super::testing::{icy_body, title, Script, ScriptedConnector};

    fn config() -> PollerConfig {
        PollerConfig::new("http://radio.example.com/live")
            .with_metadata_interval(1)
            .with_empty_interval(1)
            .with_error_interval(1)
    }

    fn next(rx: &Receiver<PollerEvent>) -> PollerEvent {
        rx.recv_timeout(Duration::from_secs(5))
            .expect("timed out waiting for poller event")
    }

    // --- Construction ---

    #[test]
    fn spawn_rejects_invalid_config() {
        let result = IcyPoller::spawn(PollerConfig::default(), ScriptedConnector::new(Vec::new()));
        assert!(matches!(result, Err(RadioError::Config(_))));
    }

    #[test]
    fn idle_until_started() {
        let connector = ScriptedConnector::new(vec![Script::Fail]);
        let requests = connector.request_counter();
        let (_poller, rx) = IcyPoller::spawn(config(), connector).unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn update_config_rejects_invalid() {
        let (poller, _rx) =
            IcyPoller::spawn(config(), ScriptedConnector::new(Vec::new())).unwrap();
        let ftp = PollerConfig {
            url: "ftp://radio.example.com/live".to_string(),
            ..config()
        };
        assert!(poller.update_config(ftp).is_err());
        assert!(poller.update_config(config().with_error_interval(2)).is_ok());
    }

    // --- Cycles ---

    #[test]
    fn metadata_then_reconnect() {
        let body = || icy_body(2, &["StreamTitle='Song A';"]);
        let connector = ScriptedConnector::new(vec![
            Script::respond(Some(2), body()),
            Script::respond(Some(2), body()),
        ]);
        let requests = connector.request_counter();
        let (poller, rx) = IcyPoller::spawn(config(), connector).unwrap();
        poller.start();

        assert!(matches!(next(&rx), PollerEvent::Stream(_)));
        match next(&rx) {
            PollerEvent::Metadata(block) => assert_eq!(block, title("Song A")),
            other => panic!("expected metadata, got {other:?}"),
        }

        // second cycle after metadataInterval; identical block is suppressed
        assert!(matches!(next(&rx), PollerEvent::Stream(_)));
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn error_retries_after_error_interval() {
        let connector = ScriptedConnector::new(Vec::new());
        let requests = connector.request_counter();
        let (poller, rx) = IcyPoller::spawn(config(), connector).unwrap();

        let started = Instant::now();
        poller.start();
        assert!(matches!(next(&rx), PollerEvent::Error(_)));
        assert!(matches!(next(&rx), PollerEvent::Error(_)));
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(requests.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn auto_update_off_polls_once() {
        let connector = ScriptedConnector::new(Vec::new());
        let requests = connector.request_counter();
        let (poller, rx) =
            IcyPoller::spawn(config().with_auto_update(false), connector).unwrap();

        poller.start();
        assert!(matches!(next(&rx), PollerEvent::Error(_)));
        assert!(rx.recv_timeout(Duration::from_millis(1500)).is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        // manual re-invocation still works
        poller.start();
        assert!(matches!(next(&rx), PollerEvent::Error(_)));
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_cancels_pending_retry() {
        let connector = ScriptedConnector::new(Vec::new());
        let requests = connector.request_counter();
        let (poller, rx) = IcyPoller::spawn(config(), connector).unwrap();

        poller.start();
        assert!(matches!(next(&rx), PollerEvent::Error(_)));
        poller.stop();
        assert!(rx.recv_timeout(Duration::from_millis(1500)).is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_then_retry() {
        let connector = ScriptedConnector::new(vec![
            Script::respond(None, Vec::new()),
            Script::respond(None, Vec::new()),
        ]);
        let (poller, rx) = IcyPoller::spawn(config(), connector).unwrap();
        poller.start();
        assert!(matches!(next(&rx), PollerEvent::Empty));
        assert!(matches!(next(&rx), PollerEvent::Empty));
    }

    #[test]
    fn drop_stops_worker() {
        let (poller, rx) =
            IcyPoller::spawn(config(), ScriptedConnector::new(Vec::new())).unwrap();
        drop(poller);

        // worker exits and drops its event sender
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match rx.recv_deadline(deadline) {
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => panic!("worker still running"),
                Ok(_) => continue,
            }
        }
    }
}
