//! Decision-free observer for a running decider.
//!
//! Loads the same definition files as the producer, reads stack snapshots
//! from a JSONL stream (file or stdin), and re-renders the mirrored stack
//! whenever an accepted snapshot changes it. Never invokes behavior logic.

mod render;
mod state;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use decider::io::loader::load_tree;
use decider::io::transport::{DebugSubscription, LineSource};

use crate::state::ViewState;

#[derive(Parser)]
#[command(
    name = "decider-viz",
    version,
    about = "Mirror and display a running decider's active stack"
)]
struct Cli {
    /// Definition files shared with the producer.
    #[arg(long = "definitions", required = true, num_args = 1..)]
    definitions: Vec<PathBuf>,

    /// JSONL snapshot stream to read, `-` for stdin.
    #[arg(long)]
    stream: PathBuf,

    /// Keep polling the stream for new snapshots after reaching its end.
    #[arg(long)]
    follow: bool,

    /// Poll interval while following, in milliseconds.
    #[arg(long, default_value_t = 200)]
    poll_ms: u64,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let tree = load_tree(&cli.definitions)?;
    let mut view = ViewState::new(tree);

    let reader: Box<dyn BufRead> = if cli.stream.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(&cli.stream).with_context(
            || format!("open snapshot stream {}", cli.stream.display()),
        )?))
    };
    let mut source = LineSource::new(reader);

    // Show the placeholder until the first snapshot lands.
    print!("{}", view.render());

    loop {
        match source.try_next() {
            Ok(Some(payload)) => {
                if view.apply(&payload) {
                    println!("---");
                    print!("{}", view.render());
                }
            }
            Ok(None) => {
                if !cli.follow {
                    break;
                }
                thread::sleep(Duration::from_millis(cli.poll_ms));
            }
            Err(err) => return Err(err),
        }
    }

    debug!(
        accepted = view.accepted(),
        rejected = view.rejected(),
        "snapshot stream ended"
    );
    Ok(())
}
