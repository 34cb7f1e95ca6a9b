//! Transmit worker: drains the ring on a fixed cadence and feeds the sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SampleEncoding;
use crate::event::{StatusChannel, StreamStatus};
use crate::format::repack_chunk;
use crate::pipeline::RingReader;
use crate::session::{PipelineState, SharedState};
use crate::sink::TransmitSink;

/// The consuming half of the pipeline.
///
/// Normally driven by [`spawn_playback_consumer`] on the async runtime;
/// exposed so a transmit-complete callback can drive
/// [`service_tick`](Self::service_tick) directly instead.
pub struct PlaybackConsumer {
    reader: RingReader,
    sink: Arc<dyn TransmitSink>,
    /// Reusable transfer chunk, container format. Starts zeroed so the very
    /// first transmit carries silence rather than stack garbage.
    chunk: Vec<u8>,
    encoding: SampleEncoding,
    trigger: usize,
    service_interval: Duration,
    read_timeout: Duration,
    status: StatusChannel,
    shared: Arc<SharedState>,
    /// Session token this worker belongs to; fences it out of any later
    /// session's shared state.
    token: u64,
    underrun_open: bool,
    consecutive_underruns: u32,
    escalation_limit: u32,
}

impl PlaybackConsumer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        reader: RingReader,
        sink: Arc<dyn TransmitSink>,
        chunk_bytes: usize,
        encoding: SampleEncoding,
        trigger: usize,
        service_interval: Duration,
        read_timeout: Duration,
        status: StatusChannel,
        shared: Arc<SharedState>,
        token: u64,
        escalation_limit: u32,
    ) -> Self {
        Self {
            reader,
            sink,
            chunk: vec![0u8; chunk_bytes],
            encoding,
            trigger,
            service_interval,
            read_timeout,
            status,
            shared,
            token,
            underrun_open: false,
            consecutive_underruns: 0,
            escalation_limit,
        }
    }

    /// Runs one service interval: state bookkeeping, then at most one chunk
    /// read, repacked and handed to the sink.
    ///
    /// Returns `false` when the transmit loop should end.
    pub async fn service_tick(&mut self) -> bool {
        if !self.shared.is_current(self.token) {
            return false;
        }

        if self.shared.take_flush() {
            let dropped = self.reader.reset();
            self.close_underrun_if_open();
            self.consecutive_underruns = 0;
            if self.shared.set_state(PipelineState::Buffering) != PipelineState::Buffering {
                self.status.post_state(PipelineState::Buffering);
            }
            tracing::info!(dropped, "ring flushed, rebuffering");
            return true;
        }

        match self.shared.state() {
            PipelineState::Buffering => {
                if !self.reader.reached(self.trigger) {
                    return true;
                }
                self.shared.set_state(PipelineState::Running);
                self.status.post_state(PipelineState::Running);
                tracing::info!(trigger = self.trigger, "ring primed, transmitting");
            }
            PipelineState::Running => {}
            PipelineState::Stopped => return false,
        }

        let want = self.chunk.len();
        let got = self.reader.read(&mut self.chunk, self.read_timeout);
        if got < want {
            // Not enough audio for a full window. Pad with silence so the
            // transmit cadence never hiccups, and report the gap.
            self.chunk[got..].fill(0);
            self.shared.record_underrun();
            self.status.post(StreamStatus::SourceNotEnoughData);
            if !self.underrun_open {
                self.underrun_open = true;
                self.status.post(StreamStatus::UnderrunOpen);
                tracing::warn!(got, want, "ring underrun opened");
            }
            self.consecutive_underruns += 1;
            if self.consecutive_underruns >= self.escalation_limit {
                tracing::error!(
                    limit = self.escalation_limit,
                    "sustained underrun, forcing pipeline stop"
                );
                self.status.post(StreamStatus::UnderrunClose);
                // A lost compare-exchange means a concurrent stop() or a
                // newer session owns the Stopped transition.
                if self.shared.force_stop(self.token)
                    && self.shared.set_state(PipelineState::Stopped) != PipelineState::Stopped
                {
                    self.status.post_state(PipelineState::Stopped);
                }
                return false;
            }
        } else {
            self.close_underrun_if_open();
            self.consecutive_underruns = 0;
        }

        if let Err(err) = self.sink.prepare().await {
            tracing::warn!(sink = self.sink.name(), %err, "sink refused transfer");
            self.status.post(StreamStatus::TransmitFault);
            return true;
        }

        let wire_len = repack_chunk(self.encoding, &mut self.chunk, want);
        match self.sink.transmit(&self.chunk[..wire_len]).await {
            Ok(()) => self.shared.record_transmitted(wire_len as u64),
            Err(err) => {
                tracing::warn!(sink = self.sink.name(), %err, "chunk transmit failed");
                self.status.post(StreamStatus::TransmitFault);
            }
        }
        true
    }

    fn close_underrun_if_open(&mut self) {
        if self.underrun_open {
            self.underrun_open = false;
            self.status.post(StreamStatus::UnderrunClose);
            tracing::info!("ring underrun closed");
        }
    }

    async fn run(mut self) {
        tracing::debug!("transmit worker started");
        let mut ticker = tokio::time::interval(self.service_interval);
        // A late tick means the window is already gone; do not replay it.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !self.service_tick().await {
                break;
            }
        }
        tracing::debug!("transmit worker stopped");
    }
}

/// Starts the transmit worker on the async runtime.
pub fn spawn_playback_consumer(consumer: PlaybackConsumer) -> JoinHandle<()> {
    tokio::spawn(consumer.run())
}
