//! icywatch — ICY metadata watcher for internet radio
//!
//! Connects to Icecast/Shoutcast streams, splits the interleaved ICY metadata
//! out of the audio bytes, and reports "now playing" changes while keeping
//! the audio available to whoever wants it.
//!
//! ## Quick start
//!
//! ```no_run
//! use icywatch::config::PollerConfig;
//! use icywatch::poller::{IcyPoller, PollerEvent};
//! use icywatch::stream::HttpConnector;
//!
//! let config = PollerConfig::new("http://radio.example.com/live");
//! let (poller, events) = IcyPoller::spawn(config, HttpConnector::new()?)?;
//! poller.start();
//! for event in events {
//!     if let PollerEvent::Metadata(block) = event {
//!         println!("{:?}", block.stream_title());
//!     }
//! }
//! # Ok::<(), icywatch::error::RadioError>(())
//! ```

pub mod config;
pub mod error;
pub mod poller;
pub mod stream;
