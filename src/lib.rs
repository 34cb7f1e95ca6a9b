//! Real-time bridge from a block-oriented audio capture source to a
//! chunk-oriented USB playback path.
//!
//! The capture side delivers fixed-size blocks on its own hardware clock;
//! the transmit side drains fixed-size chunks on a 1ms service cadence. The
//! two clock domains meet in a lock-free SPSC byte ring, so neither side
//! ever takes a lock or waits on the other.
//!
//! # Architecture
//!
//! ```text
//! CaptureSource --> CaptureProducer --> TransferRing --> PlaybackConsumer --> TransmitSink
//!  (hw blocks)       (own thread)       (SPSC bytes)      (tokio task)       (USB endpoint)
//! ```
//!
//! - [`CaptureSource`] abstracts the capture hardware; [`MockCaptureSource`]
//!   is a deterministic stand-in for tests and bring-up
//! - [`TransmitSink`] abstracts the USB endpoint; [`ChannelSink`] and
//!   [`NullSink`] cover integration and soak testing
//! - [`Pipeline`] owns the workers and exposes start/stop/flush
//! - [`StatusEvent`]s report overrun, underrun and fault conditions without
//!   ever blocking the data path
//!
//! The pipeline buffers before it transmits: after start it stays in
//! [`PipelineState::Buffering`] until one transmit window of audio has
//! accumulated, which absorbs capture-side jitter for the rest of the
//! session. 24-bit samples captured in 32-bit containers are compacted to
//! 3 bytes per sample on the way out.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use usb_audio_bridge::{
//!     AudioFormatProfile, ChannelSink, MockCaptureSource, Pipeline, PipelineConfig,
//!     spawn_status_logger,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), usb_audio_bridge::BridgeError> {
//!     let profile = AudioFormatProfile::new(32, 24)?;
//!     let source = MockCaptureSource::sine(profile, 440.0);
//!     let (sink, mut chunks) = ChannelSink::new(64);
//!
//!     let mut pipeline = Pipeline::new(PipelineConfig::default());
//!     if let Some(events) = pipeline.take_status_events() {
//!         spawn_status_logger(events);
//!     }
//!     pipeline.start(profile, source, Arc::new(sink))?;
//!
//!     for _ in 0..100 {
//!         if let Some(chunk) = chunks.recv().await {
//!             // hand `chunk` to the USB endpoint
//!             let _ = chunk;
//!         }
//!     }
//!     pipeline.stop().await
//! }
//! ```

mod config;
mod error;
mod event;
pub mod format;
mod pipeline;
mod session;
mod sink;
mod source;

pub use config::{
    AudioFormatProfile, PipelineConfig, SampleEncoding, NUM_CHANNELS, RING_CAPACITY_MS,
    SAMPLES_PER_MS, SAMPLE_RATE_HZ, TRANSMIT_WINDOW_MS,
};
pub use error::{BridgeError, SourceError, TransmitError};
pub use event::{spawn_status_logger, StatusChannel, StatusEvent, StreamStatus};
pub use pipeline::{RingReader, RingWriter, TransferRing};
pub use session::{Pipeline, PipelineState, PipelineStats};
pub use sink::{ChannelSink, NullSink, TransmitSink};
pub use source::{CaptureSource, MockCaptureSource};
