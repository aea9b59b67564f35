//! Outbound channel abstraction
//!
//! The dispatcher only needs a way to publish envelopes. Connection setup,
//! subscription and delivery belong to the transport that implements
//! [`Channel`]. A channel must preserve submission order for a given topic.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use tokio::time::Instant;

use super::envelope::RequestEnvelope;
use super::error::ChannelError;

/// Transport that accepts request envelopes
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish one envelope
    async fn publish(&self, envelope: &RequestEnvelope) -> Result<(), ChannelError>;
}

/// An envelope captured by [`RecordingChannel`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEnvelope {
    /// Time the publish call was accepted
    pub at: Instant,
    /// Envelope as published
    pub envelope: RequestEnvelope,
}

#[derive(Debug, Default)]
struct RecordingState {
    published: Vec<PublishedEnvelope>,
    failures_pending: u32,
    attempts: u64,
    closed: bool,
}

/// In-memory channel that records every accepted envelope
///
/// Failures can be scripted with [`fail_next`](Self::fail_next) and
/// [`close`](Self::close). Failed attempts are counted but not recorded.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    state: Mutex<RecordingState>,
}

impl RecordingChannel {
    /// Create an empty recording channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` publish attempts fail with a transport error
    pub fn fail_next(&self, count: u32) {
        self.state.lock().failures_pending = count;
    }

    /// Reject every further publish with [`ChannelError::Closed`]
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Accept publishes again after [`close`](Self::close)
    pub fn reopen(&self) {
        self.state.lock().closed = false;
    }

    /// Every accepted envelope with its timestamp
    pub fn published(&self) -> Vec<PublishedEnvelope> {
        self.state.lock().published.clone()
    }

    /// Every accepted envelope, in order
    pub fn envelopes(&self) -> Vec<RequestEnvelope> {
        self.state
            .lock()
            .published
            .iter()
            .map(|record| record.envelope.clone())
            .collect()
    }

    /// Number of accepted envelopes
    pub fn len(&self) -> usize {
        self.state.lock().published.len()
    }

    /// Whether nothing has been accepted yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of publish attempts, failed ones included
    pub fn attempts(&self) -> u64 {
        self.state.lock().attempts
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.state.lock().published.clear();
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn publish(&self, envelope: &RequestEnvelope) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if state.closed {
            return Err(ChannelError::Closed);
        }
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(ChannelError::Transport("scripted failure".to_string()));
        }
        state.published.push(PublishedEnvelope {
            at: Instant::now(),
            envelope: envelope.clone(),
        });
        Ok(())
    }
}

/// Channel that writes each envelope as one line of wire JSON
pub struct WriterChannel<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterChannel<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the inner writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> Channel for WriterChannel<W> {
    async fn publish(&self, envelope: &RequestEnvelope) -> Result<(), ChannelError> {
        let line = envelope.to_wire()?;
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
