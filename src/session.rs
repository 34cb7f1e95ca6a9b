//! Pipeline lifecycle: the state machine and the start/stop/flush surface.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{AudioFormatProfile, PipelineConfig};
use crate::error::BridgeError;
use crate::event::{StatusChannel, StatusEvent, StreamStatus};
use crate::pipeline::{
    spawn_capture_producer, spawn_playback_consumer, CaptureProducer, PlaybackConsumer,
    ProducerHandle, TransferRing,
};
use crate::sink::TransmitSink;
use crate::source::CaptureSource;

/// Authoritative pipeline state.
///
/// Transitions:
/// - `Stopped -> Buffering` on start
/// - `Buffering -> Running` when ring occupancy reaches the trigger level
/// - `Running -> Buffering` on flush
/// - any non-stopped state `-> Stopped` on stop or fault escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    /// No workers live. The only state in which start is legal.
    Stopped = 0,
    /// Capturing, but holding transmission until the ring primes.
    Buffering = 1,
    /// Capturing and transmitting.
    Running = 2,
}

impl PipelineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Buffering,
            2 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// State shared between the control surface and both workers.
///
/// Everything here is atomic; the workers never take a lock on the data path.
///
/// The session word packs a generation count (upper bits) with the armed
/// flag (bit 0). Workers hold the token their session was started with, so a
/// worker left over from a previous session can neither keep running nor
/// force-stop the current one.
pub(crate) struct SharedState {
    session: AtomicU64,
    state: AtomicU8,
    flush_requested: AtomicBool,
    bytes_captured: AtomicU64,
    bytes_transmitted: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            session: AtomicU64::new(0),
            state: AtomicU8::new(PipelineState::Stopped as u8),
            flush_requested: AtomicBool::new(false),
            bytes_captured: AtomicU64::new(0),
            bytes_transmitted: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    /// Opens a new armed session and returns its token.
    ///
    /// Control-surface calls are serialized by `&mut Pipeline`, so a plain
    /// load/store pair is enough here; the workers only ever read or CAS.
    pub(crate) fn begin_session(&self) -> u64 {
        let next = (((self.session.load(Ordering::SeqCst) >> 1) + 1) << 1) | 1;
        self.session.store(next, Ordering::SeqCst);
        next
    }

    pub(crate) fn disarm(&self) {
        self.session.fetch_and(!1, Ordering::SeqCst);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.session.load(Ordering::SeqCst) & 1 == 1
    }

    /// Whether `token` names the live, still-armed session.
    pub(crate) fn is_current(&self, token: u64) -> bool {
        token & 1 == 1 && self.session.load(Ordering::SeqCst) == token
    }

    /// Disarms the session named by `token`, if it is still the live one.
    ///
    /// Returns whether this call performed the disarm. The compare-exchange
    /// makes the worker-side forced stop and a concurrent `stop()` or
    /// restart agree on exactly one winner.
    pub(crate) fn force_stop(&self, token: u64) -> bool {
        self.session
            .compare_exchange(token, token & !1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Swaps in a new state, returning the previous one so the caller can
    /// post the transition event exactly once.
    pub(crate) fn set_state(&self, state: PipelineState) -> PipelineState {
        PipelineState::from_u8(self.state.swap(state as u8, Ordering::SeqCst))
    }

    pub(crate) fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn request_flush(&self) {
        self.flush_requested.store(true, Ordering::SeqCst);
    }

    /// Consumes a pending flush request, if any.
    pub(crate) fn take_flush(&self) -> bool {
        self.flush_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn record_captured(&self, bytes: u64) {
        self.bytes_captured.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_transmitted(&self, bytes: u64) {
        self.bytes_transmitted.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    fn reset_counters(&self) {
        self.bytes_captured.store(0, Ordering::Relaxed);
        self.bytes_transmitted.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            bytes_transmitted: self.bytes_transmitted.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}

/// Cumulative counters for the current (or most recent) session.
///
/// Reset on every start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Container-format bytes accepted into the ring.
    pub bytes_captured: u64,
    /// Wire-format bytes handed to the sink.
    pub bytes_transmitted: u64,
    /// Capture blocks that did not fully fit in the ring.
    pub overruns: u64,
    /// Transmit windows served with fewer bytes than requested.
    pub underruns: u64,
}

struct Workers {
    producer: ProducerHandle,
    consumer: JoinHandle<()>,
}

/// The capture-to-USB bridge pipeline.
///
/// Owns the ring, both workers and the status channel. One `Pipeline` can be
/// started and stopped repeatedly; each start builds a fresh ring and fresh
/// workers.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use usb_audio_bridge::{
///     AudioFormatProfile, MockCaptureSource, NullSink, Pipeline, PipelineConfig,
/// };
///
/// # async fn demo() -> Result<(), usb_audio_bridge::BridgeError> {
/// let mut pipeline = Pipeline::new(PipelineConfig::default());
/// let profile = AudioFormatProfile::new(32, 24)?;
/// let source = MockCaptureSource::sine(profile, 440.0);
///
/// pipeline.start(profile, source, Arc::new(NullSink::new()))?;
/// // ... stream ...
/// pipeline.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    shared: Arc<SharedState>,
    status: StatusChannel,
    status_rx: Option<mpsc::Receiver<StatusEvent>>,
    workers: Option<Workers>,
}

impl Pipeline {
    /// Creates a stopped pipeline with the given tunables.
    pub fn new(config: PipelineConfig) -> Self {
        let (status, status_rx) = StatusChannel::new(config.status_capacity);
        Self {
            config,
            shared: Arc::new(SharedState::new()),
            status,
            status_rx: Some(status_rx),
            workers: None,
        }
    }

    /// Takes the status event receiver.
    ///
    /// Available once per pipeline. Hand it to
    /// [`spawn_status_logger`](crate::spawn_status_logger) for log-only
    /// observation, or drain it directly for programmatic monitoring.
    pub fn take_status_events(&mut self) -> Option<mpsc::Receiver<StatusEvent>> {
        self.status_rx.take()
    }

    /// Starts streaming: validates the source, builds the ring, spawns both
    /// workers and enters BUFFERING.
    ///
    /// Must be called from within a tokio runtime; the transmit worker runs
    /// as a task on it.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::AlreadyStarted`] if the pipeline is live (a forced
    ///   stop counts as stopped; restarting from one needs no `stop()` call)
    /// - [`BridgeError::SourceConfig`] if the source rejects the profile
    pub fn start(
        &mut self,
        profile: AudioFormatProfile,
        mut source: impl CaptureSource,
        sink: Arc<dyn TransmitSink>,
    ) -> Result<(), BridgeError> {
        if let Some(stale) = self.workers.take() {
            if self.shared.state() != PipelineState::Stopped {
                self.workers = Some(stale);
                return Err(BridgeError::AlreadyStarted);
            }
            // A forced stop already disarmed this session but nobody reaped
            // the handles. The fresh session token below fences the old
            // workers out of the shared state, so detaching them is safe.
            tracing::debug!("detaching workers left by a forced stop");
            drop(stale);
        }

        if let Err(err) = source.configure(&profile) {
            self.status.post(StreamStatus::SourceInvalidConfig);
            return Err(BridgeError::SourceConfig {
                reason: err.to_string(),
            });
        }

        let (writer, reader) = TransferRing::create(profile.ring_capacity_bytes as usize);
        self.shared.reset_counters();
        let token = self.shared.begin_session();
        self.shared.set_state(PipelineState::Buffering);
        self.status.post_state(PipelineState::Buffering);

        let producer = CaptureProducer::new(
            Box::new(source),
            writer,
            profile.capture_block_bytes as usize,
            self.status.clone(),
            Arc::clone(&self.shared),
            token,
            self.config.fault_escalation_limit,
        );
        let consumer = PlaybackConsumer::new(
            reader,
            sink,
            profile.transfer_chunk_bytes(),
            profile.encoding,
            profile.ring_trigger_bytes as usize,
            self.config.service_interval,
            self.config.read_timeout,
            self.status.clone(),
            Arc::clone(&self.shared),
            token,
            self.config.fault_escalation_limit,
        );

        tracing::info!(
            encoding = ?profile.encoding,
            ring_bytes = profile.ring_capacity_bytes,
            trigger_bytes = profile.ring_trigger_bytes,
            "pipeline starting"
        );
        self.workers = Some(Workers {
            producer: spawn_capture_producer(producer),
            consumer: spawn_playback_consumer(consumer),
        });
        Ok(())
    }

    /// Stops streaming and waits for both workers to wind down.
    ///
    /// The capture worker must acknowledge teardown before its buffers are
    /// considered released; if it does not within the shutdown timeout the
    /// pipeline still transitions to STOPPED but the error is surfaced.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NotRunning`] if the pipeline is not live
    /// - [`BridgeError::ShutdownTimeout`] if the capture worker is wedged
    pub async fn stop(&mut self) -> Result<(), BridgeError> {
        let workers = self.workers.take().ok_or(BridgeError::NotRunning)?;
        self.shared.disarm();

        if workers.consumer.await.is_err() {
            tracing::warn!("transmit worker panicked during shutdown");
        }

        let timeout = self.config.shutdown_timeout;
        let acked = workers.producer.shutdown(timeout).await;

        if self.shared.set_state(PipelineState::Stopped) != PipelineState::Stopped {
            self.status.post_state(PipelineState::Stopped);
        }

        if acked {
            tracing::info!("pipeline stopped");
            Ok(())
        } else {
            // The thread is presumed wedged on its hardware read; joining it
            // would wedge us too.
            tracing::error!(timeout_ms = timeout.as_millis() as u64, "capture worker unresponsive");
            Err(BridgeError::ShutdownTimeout {
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    /// Discards all buffered audio and drops back to BUFFERING.
    ///
    /// The reset happens on the transmit worker's next service interval, so
    /// it never races the data path.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotRunning`] if the pipeline is not live
    /// (never started, stopped, or taken down by a forced stop).
    pub fn flush(&mut self) -> Result<(), BridgeError> {
        if !self.shared.is_armed() {
            return Err(BridgeError::NotRunning);
        }
        self.shared.request_flush();
        Ok(())
    }

    /// Current authoritative state.
    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// Snapshot of the session counters.
    pub fn stats(&self) -> PipelineStats {
        self.shared.snapshot()
    }
}
