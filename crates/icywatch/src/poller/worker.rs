//! Poller worker thread
//!
//! Owns every piece of poller state and runs the request/listen/schedule
//! cycle on one thread. The handle only talks to it through [`Command`]s, so
//! nothing here needs a lock.

use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use crossbeam_channel::{at, never, select, Receiver, Sender, TryRecvError};
use tracing::{debug, info, warn};

use crate::config::demux::READ_CHUNK_SIZE;
use crate::config::PollerConfig;
use crate::error::RadioError;
use crate::stream::{
    AudioStream, Connector, Demuxed, IcyDemuxer, MetadataBlock, StreamRequest, StreamResponse,
};

use super::types::{Command, PendingRequest, PollerEvent, StreamHandle};

pub(crate) struct PollerWorker<C: Connector> {
    config: PollerConfig,
    connector: C,
    events: Sender<PollerEvent>,
    control: Receiver<Command>,
    previous: MetadataBlock,
    pending: Option<PendingRequest>,
    generation: u64,
    request_now: bool,
    shutdown: bool,
}

impl<C: Connector> PollerWorker<C> {
    pub fn new(
        config: PollerConfig,
        connector: C,
        events: Sender<PollerEvent>,
        control: Receiver<Command>,
    ) -> Self {
        Self {
            config,
            connector,
            events,
            control,
            previous: MetadataBlock::new(),
            pending: None,
            generation: 0,
            request_now: false,
            shutdown: false,
        }
    }

    /// Worker main loop: wait for a command or the pending timer, whichever
    /// comes first. Returns on shutdown or when the handle is gone.
    pub fn run(mut self) {
        info!(url = %self.config.url, "poller worker started");

        while !self.shutdown {
            if std::mem::take(&mut self.request_now) {
                self.request();
                continue;
            }

            let control = self.control.clone();
            let timer = match self.pending {
                Some(pending) => at(pending.deadline),
                None => never(),
            };

            select! {
                recv(control) -> cmd => match cmd {
                    Ok(cmd) => {
                        self.handle_command(cmd);
                    }
                    Err(_) => self.shutdown = true,
                },
                recv(timer) -> _ => {
                    self.pending = None;
                    self.request();
                }
            }
        }

        info!(url = %self.config.url, "poller worker stopped");
    }

    /// Apply a command. Returns true if a live response must be released.
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Start => {
                self.cancel_pending();
                self.request_now = true;
                true
            }
            Command::Stop => {
                self.cancel_pending();
                self.request_now = false;
                true
            }
            Command::UpdateConfig(config) => {
                debug!(url = %config.url, "configuration updated");
                self.config = *config;
                false
            }
            Command::Shutdown => {
                self.cancel_pending();
                self.shutdown = true;
                true
            }
        }
    }

    /// Drain queued commands without blocking. True if the live session has
    /// to end.
    fn session_interrupted(&mut self) -> bool {
        if self.shutdown {
            return true;
        }
        let mut interrupted = false;
        loop {
            match self.control.try_recv() {
                Ok(cmd) => interrupted |= self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.shutdown = true;
                    interrupted = true;
                    break;
                }
            }
        }
        interrupted
    }

    /// One full cycle: connect, then classify the response.
    pub fn request(&mut self) {
        let request = StreamRequest::from_config(&self.config);
        debug!(url = %request.url, "requesting stream");

        let response = match self.connector.connect(&request) {
            Ok(response) => response,
            Err(e) => return self.on_error(e),
        };

        match response.headers.metaint {
            None => self.on_empty(response),
            Some(metaint) => match IcyDemuxer::new(metaint) {
                Ok(demuxer) => self.listen(response, demuxer),
                Err(e) => {
                    drop(response);
                    self.on_error(e);
                }
            },
        }
    }

    fn on_error(&mut self, err: RadioError) {
        warn!(url = %self.config.url, error = %err, "stream request failed");
        self.emit(PollerEvent::Error(err));
        self.schedule(self.config.error_delay());
    }

    fn on_empty(&mut self, response: StreamResponse) {
        debug!(url = %self.config.url, "server sent no icy-metaint");
        self.emit(PollerEvent::Empty);

        if self.config.keep_listen {
            self.hold_open(response);
        } else {
            drop(response);
            self.schedule(self.config.empty_delay());
        }
    }

    /// Keep a metadata-less response open until the server closes it.
    fn hold_open(&mut self, response: StreamResponse) {
        let mut body = response.body;
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            if self.session_interrupted() {
                return;
            }
            match body.read(&mut buf) {
                Ok(0) => {
                    drop(body);
                    return self.on_end(false);
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    drop(body);
                    return self.on_error(e.into());
                }
            }
        }
    }

    /// Pipe a metadata-carrying response through the demuxer until the first
    /// block releases it (or forever, when keep-listening).
    fn listen(&mut self, response: StreamResponse, mut demuxer: IcyDemuxer) {
        info!(
            url = %self.config.url,
            metaint = demuxer.meta_interval(),
            station = response.headers.station_name.as_deref().unwrap_or(""),
            "listening for metadata"
        );

        let (audio_tx, audio) = AudioStream::channel();
        let mut audio_tx = Some(audio_tx);
        self.emit(PollerEvent::Stream(StreamHandle {
            headers: response.headers.clone(),
            audio,
        }));

        let mut body = response.body;
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut saw_metadata = false;

        loop {
            if self.session_interrupted() {
                debug!("live response released on command");
                return;
            }

            let n = match body.read(&mut buf) {
                Ok(0) => {
                    let truncated = demuxer.finish();
                    debug!(
                        audio_bytes = demuxer.audio_bytes(),
                        segments = demuxer.segments_decoded(),
                        truncated,
                        "server closed the response"
                    );
                    drop(body);
                    drop(audio_tx);
                    return self.on_end(saw_metadata);
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    drop(body);
                    drop(audio_tx);
                    return self.on_error(e.into());
                }
            };

            let mut released = false;
            demuxer.feed(&buf[..n], |out| {
                if released {
                    return;
                }
                match out {
                    Demuxed::Audio(bytes) => {
                        let detached = audio_tx
                            .as_ref()
                            .is_some_and(|tx| tx.send(bytes.to_vec()).is_err());
                        if detached {
                            debug!("audio consumer dropped, no longer forwarding audio");
                            audio_tx = None;
                        }
                    }
                    Demuxed::Metadata(block) => {
                        saw_metadata = true;
                        if !self.config.keep_listen {
                            released = true;
                            audio_tx = None;
                        }
                        self.deliver_metadata(block);
                    }
                }
            });

            if released {
                debug!(
                    audio_bytes = demuxer.audio_bytes(),
                    segments = demuxer.segments_decoded(),
                    "live response released after first block"
                );
                drop(body);
                self.schedule(self.config.metadata_delay());
                return;
            }
        }
    }

    /// The server closed the response before we released it.
    fn on_end(&mut self, saw_metadata: bool) {
        if self.config.keep_listen {
            info!(url = %self.config.url, "stream ended");
            self.emit(PollerEvent::End);
        } else {
            // Closed before the first block; without a retry nothing would
            // wake the worker again
            debug!(saw_metadata, "stream closed before metadata, retrying");
            self.schedule(self.config.error_delay());
        }
    }

    /// Apply change-only filtering and publish.
    fn deliver_metadata(&mut self, block: MetadataBlock) {
        if self.config.notify_on_change_only {
            if !block.differs_from(&self.previous) {
                debug!("metadata unchanged, not notifying");
                return;
            }
            self.previous = block.clone();
        }
        debug!(title = block.stream_title().unwrap_or(""), "metadata");
        self.emit(PollerEvent::Metadata(block));
    }

    fn emit(&mut self, event: PollerEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped, shutting down");
            self.cancel_pending();
            self.shutdown = true;
        }
    }

    /// Schedule the next request, replacing any pending one.
    fn schedule(&mut self, delay: Duration) {
        if self.shutdown {
            return;
        }
        if !self.config.auto_update || self.config.keep_listen {
            debug!(
                auto_update = self.config.auto_update,
                keep_listen = self.config.keep_listen,
                "not scheduling another request"
            );
            return;
        }
        self.cancel_pending();
        self.generation += 1;
        self.pending = Some(PendingRequest {
            deadline: Instant::now() + delay,
            delay,
            generation: self.generation,
        });
        debug!(delay_secs = delay.as_secs(), "next request scheduled");
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(generation = pending.generation, "pending request cancelled");
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    #[cfg(test)]
    pub(crate) fn previous(&self) -> &MetadataBlock {
        &self.previous
    }
}
