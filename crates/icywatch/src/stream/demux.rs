//! ICY demultiplexer
//!
//! Splits an interleaved ICY byte stream into audio bytes and decoded
//! metadata blocks. The wire layout repeats forever:
//!
//! ```text
//! [metaint audio bytes][L][L * 16 metadata bytes][metaint audio bytes][L]...
//! ```
//!
//! Input arrives in chunks with network-determined boundaries, so all state
//! (position within the audio run, bytes left in the current metadata
//! segment) is carried across calls to [`IcyDemuxer::feed`].

use crate::config::demux::METADATA_BLOCK_UNIT;
use crate::error::{RadioError, Result};
use crate::stream::metadata::{decode_metadata_segment, MetadataBlock};

/// Output of the demuxer, in stream order
#[derive(Debug, PartialEq, Eq)]
pub enum Demuxed<'a> {
    /// Audio bytes borrowed from the input chunk
    Audio(&'a [u8]),
    /// A complete, non-empty metadata segment
    Metadata(MetadataBlock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemuxState {
    /// Forwarding audio. When `bytes_until_marker` is 0 the next byte is the
    /// metadata length byte.
    ReadingAudio,
    /// Collecting `pending_metadata_len` more bytes of a metadata segment.
    ReadingMetadata,
}

/// Chunk-boundary independent ICY demuxer for a single response.
#[derive(Debug)]
pub struct IcyDemuxer {
    meta_interval: usize,
    state: DemuxState,
    bytes_until_marker: usize,
    pending_metadata_len: usize,
    metadata_buffer: Vec<u8>,
    audio_bytes: u64,
    segments: u64,
}

impl IcyDemuxer {
    /// Create a demuxer for a stream with `meta_interval` audio bytes between
    /// metadata segments. Zero or negative intervals are rejected.
    pub fn new(meta_interval: i64) -> Result<Self> {
        let interval = usize::try_from(meta_interval)
            .ok()
            .filter(|&n| n > 0)
            .ok_or(RadioError::InvalidMetaInterval(meta_interval))?;

        Ok(Self {
            meta_interval: interval,
            state: DemuxState::ReadingAudio,
            bytes_until_marker: interval,
            pending_metadata_len: 0,
            metadata_buffer: Vec::new(),
            audio_bytes: 0,
            segments: 0,
        })
    }

    pub fn meta_interval(&self) -> usize {
        self.meta_interval
    }

    /// Total audio bytes forwarded so far
    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes
    }

    /// Number of non-empty metadata segments decoded so far
    pub fn segments_decoded(&self) -> u64 {
        self.segments
    }

    /// True while part of a metadata segment has been read but not completed.
    #[cfg(test)]
    pub(crate) fn in_metadata(&self) -> bool {
        self.state == DemuxState::ReadingMetadata
    }

    /// Consume one chunk, calling `emit` for each audio run and each decoded
    /// metadata block, in stream order.
    pub fn feed<F>(&mut self, mut chunk: &[u8], mut emit: F)
    where
        F: FnMut(Demuxed<'_>),
    {
        while !chunk.is_empty() {
            match self.state {
                DemuxState::ReadingAudio if self.bytes_until_marker > 0 => {
                    let n = chunk.len().min(self.bytes_until_marker);
                    let (audio, rest) = chunk.split_at(n);
                    self.bytes_until_marker -= n;
                    self.audio_bytes += n as u64;
                    chunk = rest;
                    emit(Demuxed::Audio(audio));
                }
                DemuxState::ReadingAudio => {
                    self.pending_metadata_len = chunk[0] as usize * METADATA_BLOCK_UNIT;
                    self.bytes_until_marker = self.meta_interval;
                    chunk = &chunk[1..];
                    // L = 0: empty segment, straight back to audio
                    if self.pending_metadata_len > 0 {
                        self.state = DemuxState::ReadingMetadata;
                    }
                }
                DemuxState::ReadingMetadata => {
                    let n = chunk.len().min(self.pending_metadata_len);
                    let (segment, rest) = chunk.split_at(n);
                    self.metadata_buffer.extend_from_slice(segment);
                    self.pending_metadata_len -= n;
                    chunk = rest;

                    if self.pending_metadata_len == 0 {
                        let block = decode_metadata_segment(&self.metadata_buffer);
                        self.metadata_buffer.clear();
                        self.state = DemuxState::ReadingAudio;
                        self.segments += 1;
                        emit(Demuxed::Metadata(block));
                    }
                }
            }
        }
    }

    /// Signal end of stream. A partially read metadata segment is dropped
    /// without emitting anything; returns whether that happened.
    pub fn finish(&mut self) -> bool {
        let truncated = self.state == DemuxState::ReadingMetadata;
        if truncated {
            tracing::debug!(
                missing = self.pending_metadata_len,
                "stream ended inside a metadata segment"
            );
        }
        self.metadata_buffer.clear();
        self.pending_metadata_len = 0;
        self.state = DemuxState::ReadingAudio;
        self.bytes_until_marker = self.meta_interval;
        truncated
    }
}
