//! Transmit sink abstraction and the built-in sink implementations.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransmitError;

/// Destination for wire-format transfer chunks.
///
/// The playback consumer calls [`prepare`](TransmitSink::prepare) once per
/// service interval before handing over the chunk, then
/// [`transmit`](TransmitSink::transmit) with exactly one chunk of repacked
/// audio. Implementations must return quickly; a sink that stalls stalls the
/// whole transmit clock.
#[async_trait]
pub trait TransmitSink: Send + Sync {
    /// Human-readable sink name for logging.
    fn name(&self) -> &str;

    /// Called before each transmit, giving the sink a chance to stage the
    /// transfer (claim an endpoint buffer, check link state).
    async fn prepare(&self) -> Result<(), TransmitError> {
        Ok(())
    }

    /// Sends one wire-format chunk.
    async fn transmit(&self, chunk: &[u8]) -> Result<(), TransmitError>;
}

/// A sink that forwards chunks into a tokio channel.
///
/// The receiving half is the integration point for the actual USB endpoint
/// driver (or a test harness). Uses the blocking `send` so backpressure from
/// the receiver paces the consumer instead of silently dropping audio.
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelSink {
    /// Creates a sink and its chunk receiver with the given channel capacity.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TransmitSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn transmit(&self, chunk: &[u8]) -> Result<(), TransmitError> {
        self.tx
            .send(chunk.to_vec())
            .await
            .map_err(|_| TransmitError::ChannelClosed)
    }
}

/// A sink that discards every chunk, counting what passes through.
///
/// Useful for soak tests and for exercising the pipeline without a USB
/// endpoint attached.
#[derive(Default)]
pub struct NullSink {
    chunks: AtomicU64,
    bytes: AtomicU64,
}

impl NullSink {
    /// Creates a counting discard sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks discarded so far.
    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    /// Bytes discarded so far.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransmitSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    async fn transmit(&self, chunk: &[u8]) -> Result<(), TransmitError> {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}
