//! Status events for monitoring pipeline health.
//!
//! Events are non-fatal notifications about stream behavior. The data path
//! continues running after events are emitted - they exist for diagnostics
//! and metrics, not error handling, and posting one can never block the
//! producer or consumer.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::PipelineState;

/// Liveness and error notifications from the data path.
///
/// Overrun and underrun variants are edge-triggered: one `*Open` when the
/// condition appears, one `*Close` when it clears (or when a sustained
/// condition forces the pipeline to stop).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// The producer could not fit a full capture block into the ring.
    OverrunOpen,
    /// Ring writes are succeeding again after an overrun.
    OverrunClose,
    /// The consumer found fewer bytes than one transfer chunk.
    UnderrunOpen,
    /// Full transfer chunks are available again after an underrun.
    UnderrunClose,
    /// The capture source rejected its configuration.
    SourceInvalidConfig,
    /// A consumer read came up short; the missing tail was zero-filled.
    SourceNotEnoughData,
    /// The capture source's block read failed; nothing was written.
    SourceReadError,
    /// The capture source will produce no further blocks; the pipeline
    /// stops with it.
    SourceExhausted,
    /// The hardware capture path itself overflowed (payload lost before the
    /// ring).
    SourceDmaOverflow,
    /// The transmit sink reported a write failure; the chunk was dropped.
    TransmitFault,
}

/// One entry in the pipeline's status stream.
///
/// Liveness notifications and authoritative state transitions are distinct
/// enums; this union exists only at the channel boundary so a single
/// observer can drain both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// A liveness/error notification. Informational only.
    Status(StreamStatus),
    /// The state machine entered a new state. Authoritative.
    State(PipelineState),
}

/// Best-effort sending half of the status stream.
///
/// Posting never blocks: if the observer falls behind and the channel fills,
/// events are dropped and counted. Cloneable so producer, consumer and the
/// state machine can all post; usable from both async tasks and plain
/// threads.
#[derive(Clone)]
pub struct StatusChannel {
    tx: mpsc::Sender<StatusEvent>,
}

impl StatusChannel {
    /// Creates a channel with the given capacity, returning the posting half
    /// and the receiver for the diagnostics observer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StatusEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Posts a liveness notification. Drops the event under backpressure.
    pub fn post(&self, status: StreamStatus) {
        self.send(StatusEvent::Status(status));
    }

    /// Posts a state transition. Drops the event under backpressure.
    pub fn post_state(&self, state: PipelineState) {
        self.send(StatusEvent::State(state));
    }

    fn send(&self, event: StatusEvent) {
        if self.tx.try_send(event).is_err() {
            // Observer is behind or gone. Losing a status event is
            // acceptable; stalling the data path is not.
            tracing::trace!(?event, "status channel full, event dropped");
        }
    }
}

/// Spawns the default low-priority observer: drains the status stream into
/// `tracing` until the channel closes.
///
/// Callers that want the raw events instead keep the receiver themselves and
/// skip this.
pub fn spawn_status_logger(mut rx: mpsc::Receiver<StatusEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                StatusEvent::State(state) => {
                    tracing::info!(?state, "pipeline state");
                }
                StatusEvent::Status(status) => match status {
                    StreamStatus::OverrunClose
                    | StreamStatus::UnderrunClose
                    | StreamStatus::SourceExhausted => {
                        tracing::info!(?status, "pipeline status");
                    }
                    status => {
                        tracing::warn!(?status, "pipeline status");
                    }
                },
            }
        }
    })
}
