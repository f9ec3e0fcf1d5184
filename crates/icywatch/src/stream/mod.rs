//! Stream handling
//!
//! ICY transport, the audio/metadata demuxer, and metadata parsing.

pub mod demux;
pub mod icy;
pub mod metadata;

pub use demux::{Demuxed, IcyDemuxer};
pub use icy::{AudioStream, Connector, HttpConnector, IcyHeaders, StreamRequest, StreamResponse};
pub use metadata::{MetadataBlock, StreamMetadata};
