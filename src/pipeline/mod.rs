//! The streaming data path: ring buffer, capture producer, playback consumer.
//!
//! The [`crate::Pipeline`] owns these pieces and wires them together. Each
//! worker keeps its per-cycle work in a single method (`process_block`,
//! `service_tick`) separate from its loop, so a port with its own capture or
//! transmit trigger only has to replace the loop.

mod consumer;
mod producer;
mod ring;

pub use consumer::{spawn_playback_consumer, PlaybackConsumer};
pub use producer::{spawn_capture_producer, CaptureProducer, ProducerHandle};
pub use ring::{RingReader, RingWriter, TransferRing};
