//! Transport seam for debug mirroring.
//!
//! The concrete transport between producer and observer is an integration
//! detail; the engine only needs somewhere to put a snapshot payload and the
//! mirror only needs somewhere to take one from. The in-repo implementations
//! cover tests (in-process channel) and the `decider-viz` pipeline (JSONL,
//! one snapshot per line).

use std::io::{BufRead, Write};
use std::sync::mpsc;

use anyhow::{Context, Result};
use tracing::warn;

/// Producer-side sink for serialized stack snapshots.
pub trait DebugPublisher {
    fn publish(&mut self, payload: &str) -> Result<()>;
}

/// Consumer-side source of serialized stack snapshots, drained in arrival
/// order. `Ok(None)` means nothing pending right now.
pub trait DebugSubscription {
    fn try_next(&mut self) -> Result<Option<String>>;
}

/// In-process publisher/subscription pair for tests and demos.
pub fn channel_pair() -> (ChannelPublisher, ChannelSubscription) {
    let (sender, receiver) = mpsc::channel();
    (
        ChannelPublisher { sender },
        ChannelSubscription { receiver },
    )
}

pub struct ChannelPublisher {
    sender: mpsc::Sender<String>,
}

impl DebugPublisher for ChannelPublisher {
    fn publish(&mut self, payload: &str) -> Result<()> {
        self.sender
            .send(payload.to_string())
            .context("debug channel closed")
    }
}

pub struct ChannelSubscription {
    receiver: mpsc::Receiver<String>,
}

impl DebugSubscription for ChannelSubscription {
    fn try_next(&mut self) -> Result<Option<String>> {
        match self.receiver.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            // A closed producer just means no further snapshots.
            Err(mpsc::TryRecvError::Empty | mpsc::TryRecvError::Disconnected) => Ok(None),
        }
    }
}

/// Publisher writing one snapshot per line (JSONL).
pub struct LinePublisher<W: Write> {
    writer: W,
}

impl<W: Write> LinePublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> DebugPublisher for LinePublisher<W> {
    fn publish(&mut self, payload: &str) -> Result<()> {
        writeln!(self.writer, "{payload}").context("write snapshot line")?;
        self.writer.flush().context("flush snapshot line")
    }
}

/// Subscription reading one snapshot per line (JSONL). EOF yields
/// `Ok(None)`; callers that tail a growing file simply poll again.
pub struct LineSource<R: BufRead> {
    reader: R,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> DebugSubscription for LineSource<R> {
    fn try_next(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).context("read snapshot line")?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            // Skip blank lines rather than reporting an empty snapshot.
            return self.try_next();
        }
        Ok(Some(trimmed.to_string()))
    }
}

/// Publish through the seam, reporting failure without aborting the caller.
/// Snapshot delivery is best-effort; the control loop never stops for it.
pub fn publish_or_warn<P: DebugPublisher + ?Sized>(publisher: &mut P, payload: &str) {
    if let Err(err) = publisher.publish(payload) {
        warn!(error = %format!("{err:#}"), "failed to publish stack snapshot");
    }
}
