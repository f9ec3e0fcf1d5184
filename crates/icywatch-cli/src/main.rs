//! icywatch CLI — print now-playing changes of an internet radio stream

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use icywatch::config::{network::USER_AGENT, poll, PollerConfig};
use icywatch::poller::{IcyPoller, PollerEvent, StreamHandle};
use icywatch::stream::MetadataBlock;

#[derive(Parser)]
#[command(name = "icywatch", about = "Watch ICY metadata of an Icecast/Shoutcast stream", version)]
struct Cli {
    /// Stream URL
    url: String,

    /// User-Agent header sent to the server
    #[arg(long, default_value = USER_AGENT)]
    user_agent: String,

    /// Keep one connection open instead of reconnecting after each title
    #[arg(long)]
    keep_listen: bool,

    /// Print every metadata block, even if unchanged
    #[arg(long)]
    all: bool,

    /// Poll once and exit after the first outcome
    #[arg(long)]
    once: bool,

    /// Seconds between polls after metadata was received
    #[arg(long, default_value_t = poll::METADATA_INTERVAL_SECS)]
    metadata_interval: u64,

    /// Seconds before retrying a server that sends no metadata
    #[arg(long, default_value_t = poll::EMPTY_INTERVAL_SECS)]
    empty_interval: u64,

    /// Seconds before retrying after a network error
    #[arg(long, default_value_t = poll::ERROR_INTERVAL_SECS)]
    error_interval: u64,

    /// Print every key of each block, not just the title
    #[arg(long)]
    verbose: bool,

    /// Append demuxed audio of each stream session to this file
    #[arg(long, value_name = "PATH")]
    record: Option<PathBuf>,
}

impl Cli {
    fn poller_config(&self) -> PollerConfig {
        PollerConfig::new(&self.url)
            .with_user_agent(&self.user_agent)
            .with_keep_listen(self.keep_listen)
            .with_notify_on_change_only(!self.all)
            .with_auto_update(!self.once)
            .with_metadata_interval(self.metadata_interval)
            .with_empty_interval(self.empty_interval)
            .with_error_interval(self.error_interval)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("icywatch=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let (poller, events) = IcyPoller::connect(cli.poller_config())
        .with_context(|| format!("cannot watch {}", cli.url))?;
    poller.start();

    for event in events {
        match event {
            PollerEvent::Stream(handle) => {
                if let Some(name) = &handle.headers.station_name {
                    info!(station = %name, "connected");
                }
                if let Some(path) = &cli.record {
                    record(handle, path.clone());
                }
            }
            PollerEvent::Metadata(block) => {
                print_block(&block, cli.verbose);
                if cli.once {
                    break;
                }
            }
            PollerEvent::Empty => {
                eprintln!("server sent no ICY metadata");
                if cli.once {
                    break;
                }
            }
            PollerEvent::Error(e) => {
                eprintln!("error: {e}");
                if cli.once {
                    break;
                }
            }
            PollerEvent::End => {
                eprintln!("stream ended");
                break;
            }
        }
    }

    Ok(())
}

fn print_block(block: &MetadataBlock, verbose: bool) {
    if verbose {
        for (key, value) in block.iter() {
            println!("{key}: {value}");
        }
        println!();
        return;
    }

    match block.now_playing() {
        Some(now) => match (now.artist, now.title) {
            (Some(artist), Some(title)) => println!("{artist} - {title}"),
            (None, Some(title)) => println!("{title}"),
            _ => println!("(no title)"),
        },
        None => println!("(no title)"),
    }
}

/// Copy a session's audio to `path` on a helper thread until it ends.
fn record(handle: StreamHandle, path: PathBuf) {
    let mut audio = handle.audio;
    thread::spawn(move || {
        let result = File::options()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| io::copy(&mut audio, &mut file));
        match result {
            Ok(bytes) => info!(bytes, path = %path.display(), "session audio recorded"),
            Err(e) => warn!(error = %e, path = %path.display(), "recording failed"),
        }
    });
}
