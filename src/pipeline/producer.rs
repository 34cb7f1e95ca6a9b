//! Capture worker: pulls blocks from the source and feeds the ring.
//!
//! Runs on a dedicated OS thread rather than the async runtime. The source's
//! blocking `read_block` is the capture clock, and parking an executor thread
//! on it would starve unrelated tasks.

use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;

use crate::error::SourceError;
use crate::event::{StatusChannel, StreamStatus};
use crate::pipeline::RingWriter;
use crate::session::{PipelineState, SharedState};
use crate::source::CaptureSource;

/// The producing half of the pipeline.
///
/// Normally driven by [`spawn_capture_producer`]; exposed so environments
/// with their own capture trigger (a DMA completion callback, a test harness)
/// can call [`process_block`](Self::process_block) directly.
pub struct CaptureProducer {
    source: Box<dyn CaptureSource>,
    writer: RingWriter,
    /// Reusable block buffer, sized to one capture block plus the source's
    /// framing header.
    block: Vec<u8>,
    header_len: usize,
    status: StatusChannel,
    shared: Arc<SharedState>,
    /// Session token this worker belongs to; fences it out of any later
    /// session's shared state.
    token: u64,
    overrun_open: bool,
    consecutive_overruns: u32,
    escalation_limit: u32,
}

impl CaptureProducer {
    pub(crate) fn new(
        source: Box<dyn CaptureSource>,
        writer: RingWriter,
        block_bytes: usize,
        status: StatusChannel,
        shared: Arc<SharedState>,
        token: u64,
        escalation_limit: u32,
    ) -> Self {
        let header_len = source.frame_header_len();
        Self {
            source,
            writer,
            block: vec![0u8; header_len + block_bytes],
            header_len,
            status,
            shared,
            token,
            overrun_open: false,
            consecutive_overruns: 0,
            escalation_limit,
        }
    }

    /// Captures one block and writes its payload into the ring.
    ///
    /// Returns `false` when the capture loop should end: the source is
    /// exhausted, or sustained overrun forced the pipeline down. Individual
    /// read failures are reported and survived.
    pub fn process_block(&mut self) -> bool {
        let read = match self.source.read_block(&mut self.block) {
            Ok(read) => read,
            Err(SourceError::Exhausted) => {
                // The source will never produce again; a pipeline left
                // buffering on it could not make progress. Stop outright.
                tracing::info!("capture source exhausted, stopping pipeline");
                self.status.post(StreamStatus::SourceExhausted);
                self.force_stop();
                return false;
            }
            Err(err) => {
                tracing::warn!(%err, "capture block read failed");
                self.status.post(StreamStatus::SourceReadError);
                return true;
            }
        };

        let payload_start = self.header_len.min(read);
        let payload = &self.block[payload_start..read];
        if payload.is_empty() {
            return true;
        }

        let written = self.writer.write(payload);
        self.shared.record_captured(written as u64);

        if written < payload.len() {
            // The ring rejected part of the block. The consumer is not
            // keeping up; the unwritten tail is gone.
            self.shared.record_overrun();
            self.status.post(StreamStatus::SourceDmaOverflow);
            if !self.overrun_open {
                self.overrun_open = true;
                self.status.post(StreamStatus::OverrunOpen);
                tracing::warn!(
                    dropped = payload.len() - written,
                    "ring overrun opened"
                );
            }
            self.consecutive_overruns += 1;
            if self.consecutive_overruns >= self.escalation_limit {
                tracing::error!(
                    limit = self.escalation_limit,
                    "sustained overrun, forcing pipeline stop"
                );
                self.status.post(StreamStatus::OverrunClose);
                self.force_stop();
                return false;
            }
        } else {
            if self.overrun_open {
                self.overrun_open = false;
                self.status.post(StreamStatus::OverrunClose);
                tracing::info!("ring overrun closed");
            }
            self.consecutive_overruns = 0;
        }
        true
    }

    fn force_stop(&self) {
        // If the compare-exchange loses (a concurrent stop() or a newer
        // session), whoever won owns the Stopped transition.
        if self.shared.force_stop(self.token)
            && self.shared.set_state(PipelineState::Stopped) != PipelineState::Stopped
        {
            self.status.post_state(PipelineState::Stopped);
        }
    }

    /// The capture loop: process blocks until disarmed or ended, then
    /// acknowledge teardown.
    fn run(mut self, ack: oneshot::Sender<()>) {
        tracing::debug!("capture worker started");
        while self.shared.is_current(self.token) {
            if !self.process_block() {
                break;
            }
        }
        // Buffers (ring writer, block scratch) drop here, before the
        // acknowledgement, so stop() can treat the ack as "memory released".
        drop(self.writer);
        drop(self.block);
        tracing::debug!("capture worker stopped");
        let _ = ack.send(());
    }
}

/// Handle to a running capture worker.
pub struct ProducerHandle {
    thread: thread::JoinHandle<()>,
    /// Fires when the worker has released its buffers and exited its loop.
    ack: oneshot::Receiver<()>,
}

impl ProducerHandle {
    /// Awaits the teardown acknowledgement, then joins the thread.
    ///
    /// Returns `false` if the ack did not arrive in time; the thread is left
    /// detached in that case, since joining a wedged thread would wedge the
    /// caller too.
    pub(crate) async fn shutdown(self, timeout: std::time::Duration) -> bool {
        if tokio::time::timeout(timeout, self.ack).await.is_err() {
            return false;
        }
        if self.thread.join().is_err() {
            tracing::warn!("capture worker panicked during shutdown");
        }
        true
    }
}

/// Starts the capture worker on its own thread.
pub fn spawn_capture_producer(producer: CaptureProducer) -> ProducerHandle {
    let (ack_tx, ack_rx) = oneshot::channel();
    let thread = thread::spawn(move || producer.run(ack_tx));
    ProducerHandle {
        thread,
        ack: ack_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioFormatProfile;
    use crate::event::StatusEvent;
    use crate::pipeline::TransferRing;
    use crate::source::MockCaptureSource;

    fn setup(
        source: MockCaptureSource,
        ring_capacity: usize,
        escalation_limit: u32,
    ) -> (
        CaptureProducer,
        crate::pipeline::RingReader,
        tokio::sync::mpsc::Receiver<StatusEvent>,
        Arc<SharedState>,
    ) {
        let profile = AudioFormatProfile::new(32, 24).unwrap();
        let (writer, reader) = TransferRing::create(ring_capacity);
        let (status, rx) = StatusChannel::new(64);
        let shared = Arc::new(SharedState::new());
        let token = shared.begin_session();
        let producer = CaptureProducer::new(
            Box::new(source),
            writer,
            profile.capture_block_bytes as usize,
            status,
            Arc::clone(&shared),
            token,
            escalation_limit,
        );
        (producer, reader, rx, shared)
    }

    #[test]
    fn test_block_lands_in_ring() {
        let profile = AudioFormatProfile::new(32, 24).unwrap();
        let source = MockCaptureSource::ramp(profile).unpaced();
        let (mut producer, reader, _rx, _shared) = setup(source, 4096, 250);

        assert!(producer.process_block());
        assert_eq!(reader.occupied(), profile.capture_block_bytes as usize);
    }

    #[test]
    fn test_frame_header_is_stripped() {
        let profile = AudioFormatProfile::new(32, 24).unwrap();
        let source = MockCaptureSource::silence(profile)
            .unpaced()
            .with_frame_header(12);
        let (mut producer, mut reader, _rx, _shared) = setup(source, 4096, 250);

        assert!(producer.process_block());
        // Only the payload enters the ring; the 0xEE header bytes do not.
        let mut out = vec![0xFFu8; profile.capture_block_bytes as usize];
        let n = reader.read(&mut out, std::time::Duration::ZERO);
        assert_eq!(n, profile.capture_block_bytes as usize);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_exhausted_source_stops_pipeline() {
        let profile = AudioFormatProfile::new(32, 24).unwrap();
        let source = MockCaptureSource::silence(profile)
            .unpaced()
            .with_block_limit(1);
        let (mut producer, _reader, mut rx, shared) = setup(source, 4096, 250);
        shared.set_state(PipelineState::Buffering);

        assert!(producer.process_block());
        assert!(!producer.process_block());

        // Exhaustion is announced and the pipeline comes down with it; a
        // source that ran dry below the trigger must not leave the pipeline
        // buffering forever.
        assert!(!shared.is_armed());
        assert_eq!(shared.state(), PipelineState::Stopped);
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&StatusEvent::Status(StreamStatus::SourceExhausted)));
        assert_eq!(
            events.last(),
            Some(&StatusEvent::State(PipelineState::Stopped))
        );
    }

    #[test]
    fn test_overrun_is_edge_triggered() {
        let profile = AudioFormatProfile::new(32, 24).unwrap();
        let source = MockCaptureSource::silence(profile).unpaced();
        // Ring holds exactly one block, so the second write overruns.
        let (mut producer, mut reader, mut rx, _shared) =
            setup(source, profile.capture_block_bytes as usize, 250);

        assert!(producer.process_block());
        assert!(producer.process_block());
        assert!(producer.process_block());

        assert_eq!(
            rx.try_recv(),
            Ok(StatusEvent::Status(StreamStatus::SourceDmaOverflow))
        );
        assert_eq!(
            rx.try_recv(),
            Ok(StatusEvent::Status(StreamStatus::OverrunOpen))
        );
        // Second short write reports the overflow again but not a second open.
        assert_eq!(
            rx.try_recv(),
            Ok(StatusEvent::Status(StreamStatus::SourceDmaOverflow))
        );
        assert!(rx.try_recv().is_err());

        // Drain the ring; the next full write closes the overrun.
        let mut sinkhole = vec![0u8; reader.capacity()];
        reader.read(&mut sinkhole, std::time::Duration::ZERO);
        assert!(producer.process_block());
        assert_eq!(
            rx.try_recv(),
            Ok(StatusEvent::Status(StreamStatus::OverrunClose))
        );
    }

    #[test]
    fn test_sustained_overrun_forces_stop() {
        let profile = AudioFormatProfile::new(32, 24).unwrap();
        let source = MockCaptureSource::silence(profile).unpaced();
        let (mut producer, _reader, mut rx, shared) =
            setup(source, profile.capture_block_bytes as usize, 3);
        shared.set_state(PipelineState::Running);

        assert!(producer.process_block()); // fills the ring
        assert!(producer.process_block()); // overrun 1
        assert!(producer.process_block()); // overrun 2
        assert!(!producer.process_block()); // overrun 3: escalates

        assert!(!shared.is_armed());
        assert_eq!(shared.state(), PipelineState::Stopped);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&StatusEvent::Status(StreamStatus::OverrunClose)));
        assert_eq!(
            events.last(),
            Some(&StatusEvent::State(PipelineState::Stopped))
        );
    }

    #[tokio::test]
    async fn test_spawned_worker_acks_on_disarm() {
        let profile = AudioFormatProfile::new(32, 24).unwrap();
        let source = MockCaptureSource::silence(profile).unpaced();
        let (producer, _reader, _rx, shared) = setup(source, 1 << 20, 250);

        let handle = spawn_capture_producer(producer);
        shared.disarm();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.ack)
            .await
            .expect("worker should ack promptly")
            .expect("ack channel should not drop");
    }
}
