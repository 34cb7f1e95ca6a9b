//! Error types for usb-audio-bridge.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`BridgeError`]): returned from the control surface
//!   (`start`/`stop`/`flush`) and prevent or end a streaming session
//! - **Data-path faults** ([`SourceError`], [`TransmitError`]): raised by the
//!   hardware collaborators, recovered locally and surfaced as status events

/// Fatal errors returned from the pipeline control surface.
///
/// Runtime issues (overrun, underrun, a single failed read) never surface
/// here; they are reported through the status channel and the pipeline keeps
/// running until the escalation policy says otherwise.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The requested container/sample bit-width combination is not one of
    /// the supported encodings.
    #[error("unsupported encoding: {bits_per_sample}-bit samples in {bits_per_container}-bit containers")]
    UnsupportedEncoding {
        /// Requested container width in bits.
        bits_per_container: u32,
        /// Requested sample width in bits.
        bits_per_sample: u32,
    },

    /// `start()` was called while the pipeline was already live.
    #[error("pipeline already started")]
    AlreadyStarted,

    /// `stop()` or `flush()` was called while the pipeline was stopped.
    #[error("pipeline not running")]
    NotRunning,

    /// The capture worker did not acknowledge teardown within the shutdown
    /// timeout. Buffers are released anyway; the worker thread is presumed
    /// wedged on its hardware read.
    #[error("capture worker did not acknowledge shutdown within {timeout_ms}ms")]
    ShutdownTimeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The capture source rejected its configuration at start.
    #[error("capture source rejected configuration: {reason}")]
    SourceConfig {
        /// Description from the source.
        reason: String,
    },
}

/// Faults raised by a [`CaptureSource`](crate::CaptureSource).
///
/// These are recoverable: the producer reports them on the status channel
/// and tries again on the next capture block.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The hardware read itself failed.
    #[error("capture read failed: {reason}")]
    ReadFailed {
        /// Description of the failure.
        reason: String,
    },

    /// The source is exhausted and will produce no further blocks.
    ///
    /// Mock and file-backed sources use this to end a session cleanly;
    /// hardware sources normally never return it.
    #[error("capture source exhausted")]
    Exhausted,
}

impl SourceError {
    /// Creates a read failure with the given description.
    pub fn read_failed(reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            reason: reason.into(),
        }
    }
}

/// Faults raised by a [`TransmitSink`](crate::TransmitSink).
///
/// Recoverable: the consumer reports the fault and retries nothing; the
/// chunk is lost, which real-time audio tolerates.
#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    /// A transmit operation failed.
    #[error("transmit failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// The receiving end of a channel-backed sink was dropped.
    #[error("transmit channel closed")]
    ChannelClosed,
}

impl TransmitError {
    /// Creates a write failure with the given description.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::UnsupportedEncoding {
            bits_per_container: 24,
            bits_per_sample: 24,
        };
        assert_eq!(
            err.to_string(),
            "unsupported encoding: 24-bit samples in 24-bit containers"
        );
    }

    #[test]
    fn test_shutdown_timeout_display() {
        let err = BridgeError::ShutdownTimeout { timeout_ms: 1000 };
        assert!(err.to_string().contains("1000ms"));
    }

    #[test]
    fn test_source_error_helper() {
        let err = SourceError::read_failed("dma stall");
        assert_eq!(err.to_string(), "capture read failed: dma stall");
    }

    #[test]
    fn test_transmit_error_helper() {
        let err = TransmitError::write_failed("endpoint busy");
        assert_eq!(err.to_string(), "transmit failed: endpoint busy");
    }
}
