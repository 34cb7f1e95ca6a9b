//! Audio format profile and pipeline tunables.
//!
//! The [`AudioFormatProfile`] is the single source of truth for every buffer
//! size in the pipeline. It is derived once, before start, and never mutated
//! while the pipeline is live; changing the format requires a stop/start
//! cycle.

use std::time::Duration;

use crate::error::BridgeError;

/// Fixed capture sample rate in Hz.
pub const SAMPLE_RATE_HZ: u32 = 48_000;

/// Samples per channel per millisecond at [`SAMPLE_RATE_HZ`].
pub const SAMPLES_PER_MS: u32 = SAMPLE_RATE_HZ / 1000;

/// Fixed channel count (stereo line-in).
pub const NUM_CHANNELS: u32 = 2;

/// Milliseconds of audio the consumer drains per transmit window.
///
/// Also the ring's trigger level: the pipeline leaves BUFFERING once this
/// much audio has accumulated.
pub const TRANSMIT_WINDOW_MS: u32 = 20;

/// Ring capacity in milliseconds of audio, a fixed multiple of the transmit
/// window so capacity is always an exact multiple of the trigger.
pub const RING_CAPACITY_MS: u32 = TRANSMIT_WINDOW_MS * 5;

/// Size in bytes of one hardware DMA block.
const DMA_BLOCK_BYTES: u32 = 1024;

/// Supported PCM encodings, identified by container width and the number of
/// meaningful bits inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// 16-bit samples in 16-bit containers.
    Pcm16,
    /// 24-bit samples carried in 32-bit containers; repacked to 3 bytes per
    /// sample before transmission.
    Pcm24In32,
    /// 32-bit samples in 32-bit containers.
    Pcm32,
}

impl SampleEncoding {
    /// Resolves a (container, sample) bit-width pair to an encoding.
    ///
    /// Only (16,16), (32,24) and (32,32) are valid; anything else is a
    /// configuration error the caller must reject before starting capture.
    pub fn from_bit_widths(
        bits_per_container: u32,
        bits_per_sample: u32,
    ) -> Result<Self, BridgeError> {
        match (bits_per_container, bits_per_sample) {
            (16, 16) => Ok(Self::Pcm16),
            (32, 24) => Ok(Self::Pcm24In32),
            (32, 32) => Ok(Self::Pcm32),
            _ => Err(BridgeError::UnsupportedEncoding {
                bits_per_container,
                bits_per_sample,
            }),
        }
    }

    /// Bytes occupied by one sample's container on the capture side.
    pub fn container_bytes(self) -> u32 {
        match self {
            Self::Pcm16 => 2,
            Self::Pcm24In32 | Self::Pcm32 => 4,
        }
    }

    /// Bytes occupied by one sample on the wire, after any repacking.
    pub fn wire_bytes(self) -> u32 {
        match self {
            Self::Pcm16 => 2,
            Self::Pcm24In32 => 3,
            Self::Pcm32 => 4,
        }
    }

    /// Whether the consumer must compact containers before transmission.
    pub fn needs_repack(self) -> bool {
        matches!(self, Self::Pcm24In32)
    }
}

/// Derived sizing constants for one audio format.
///
/// Immutable once built. Every buffer in the pipeline (capture block, ring,
/// transmit chunk) is sized from these fields, so producer and consumer can
/// never disagree about byte rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormatProfile {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u32,
    /// PCM encoding carried through the ring.
    pub encoding: SampleEncoding,
    /// Bytes of container-format audio produced per millisecond.
    pub bytes_per_ms: u32,
    /// Bytes of wire-format audio transmitted per millisecond.
    pub wire_bytes_per_ms: u32,
    /// Size in bytes of one hardware capture block.
    pub capture_block_bytes: u32,
    /// Total ring capacity in bytes.
    pub ring_capacity_bytes: u32,
    /// Ring occupancy that moves the pipeline from BUFFERING to RUNNING.
    pub ring_trigger_bytes: u32,
}

impl AudioFormatProfile {
    /// Builds a profile from the requested container/sample bit widths.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnsupportedEncoding`] if the width combination
    /// is not one of the three supported encodings.
    pub fn new(bits_per_container: u32, bits_per_sample: u32) -> Result<Self, BridgeError> {
        let encoding = SampleEncoding::from_bit_widths(bits_per_container, bits_per_sample)?;
        Ok(Self::from_encoding(encoding))
    }

    /// Builds a profile for an already-resolved encoding.
    pub fn from_encoding(encoding: SampleEncoding) -> Self {
        let bytes_per_ms = SAMPLES_PER_MS * encoding.container_bytes() * NUM_CHANNELS;
        // Whole milliseconds of audio that fit in one DMA block. 2ms when
        // capturing 32-bit containers, 5ms for 16-bit.
        let block_ms = DMA_BLOCK_BYTES / bytes_per_ms;

        Self {
            sample_rate: SAMPLE_RATE_HZ,
            channels: NUM_CHANNELS,
            encoding,
            bytes_per_ms,
            wire_bytes_per_ms: SAMPLES_PER_MS * encoding.wire_bytes() * NUM_CHANNELS,
            capture_block_bytes: bytes_per_ms * block_ms,
            ring_capacity_bytes: bytes_per_ms * RING_CAPACITY_MS,
            ring_trigger_bytes: bytes_per_ms * TRANSMIT_WINDOW_MS,
        }
    }

    /// Bytes the consumer pulls from the ring per service interval.
    pub fn transfer_chunk_bytes(&self) -> usize {
        self.bytes_per_ms as usize
    }

    /// Bytes handed to the transmit path per service interval.
    pub fn wire_chunk_bytes(&self) -> usize {
        self.wire_bytes_per_ms as usize
    }
}

/// Runtime tunables for the pipeline.
///
/// Use [`PipelineConfig::default()`] for the reference behavior, or adjust
/// per deployment.
///
/// # Example
///
/// ```
/// use usb_audio_bridge::PipelineConfig;
///
/// let config = PipelineConfig {
///     fault_escalation_limit: 100,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Cadence of the transmit service interval.
    ///
    /// One transfer chunk is drained per tick. Default: 1ms (USB full-speed
    /// isochronous frame interval).
    pub service_interval: Duration,

    /// Bounded wait applied to each ring read in the consumer.
    ///
    /// The default of zero returns immediately with whatever is available,
    /// so a transmit callback can never miss its deadline waiting on the
    /// ring. Raise it only if the transmit context tolerates a short block.
    pub read_timeout: Duration,

    /// Consecutive overrun or underrun events before the pipeline force-stops
    /// rather than limping along. Default: 250 (a quarter second of failed
    /// service intervals).
    pub fault_escalation_limit: u32,

    /// Capacity of the status event channel. Events beyond this are dropped
    /// rather than blocking the data path. Default: 64.
    pub status_capacity: usize,

    /// How long `stop()` waits for the capture worker to acknowledge
    /// teardown before giving up. Default: 1s.
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service_interval: Duration::from_millis(1),
            read_timeout: Duration::ZERO,
            fault_escalation_limit: 250,
            status_capacity: 64,
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}
