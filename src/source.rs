//! Capture source abstraction and a hardware-free mock implementation.
//!
//! The pipeline only depends on one fact about the capture hardware: a
//! fixed-size block of bytes becomes available periodically. Everything
//! else (bus setup, clocking, DMA descriptors) lives behind this trait.

use std::time::Duration;

use crate::config::AudioFormatProfile;
use crate::error::SourceError;

/// A periodic producer of fixed-size capture blocks.
///
/// `read_block` is called once per capture cycle from the dedicated capture
/// worker. Hardware implementations typically block inside it until the DMA
/// engine hands over the next buffer - that blocking *is* the capture
/// pacing. The implementation must fill from the front of `buf` and return
/// the byte count.
pub trait CaptureSource: Send + 'static {
    /// Validates the source against the active profile before streaming.
    ///
    /// Called once during pipeline start; an error here fails the start and
    /// is surfaced as `SourceInvalidConfig`.
    fn configure(&mut self, profile: &AudioFormatProfile) -> Result<(), SourceError> {
        let _ = profile;
        Ok(())
    }

    /// Reads the next capture block into `buf`, returning the bytes read.
    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;

    /// Fixed framing header size preceding the payload in each block.
    ///
    /// The producer strips this many bytes before the payload enters the
    /// ring. Zero for sources that deliver bare PCM.
    fn frame_header_len(&self) -> usize {
        0
    }
}

/// A deterministic capture source for tests and hardware-free operation.
///
/// Generates container-format PCM on demand (silence, sine, or a byte ramp)
/// and optionally paces itself to real time so the pipeline experiences a
/// realistic capture clock.
///
/// # Example
///
/// ```
/// use usb_audio_bridge::{AudioFormatProfile, MockCaptureSource};
///
/// let profile = AudioFormatProfile::new(32, 24).unwrap();
/// let mut mock = MockCaptureSource::sine(profile, 440.0);
/// mock = mock.unpaced(); // run as fast as the pipeline pulls
/// ```
pub struct MockCaptureSource {
    profile: AudioFormatProfile,
    signal: Signal,
    /// Absolute frame position, carried across blocks so sine phase is
    /// continuous.
    frame_pos: u64,
    paced: bool,
    header_len: usize,
    /// Remaining blocks before reporting exhaustion, or `None` for endless.
    blocks_left: Option<u64>,
}

enum Signal {
    Silence,
    Sine { frequency: f64 },
    Ramp,
}

impl MockCaptureSource {
    /// A source producing digital silence.
    pub fn silence(profile: AudioFormatProfile) -> Self {
        Self::new(profile, Signal::Silence)
    }

    /// A source producing a full-scale-quarter sine tone at `frequency` Hz
    /// on both channels.
    pub fn sine(profile: AudioFormatProfile, frequency: f64) -> Self {
        Self::new(profile, Signal::Sine { frequency })
    }

    /// A source producing an incrementing byte ramp, convenient for
    /// asserting byte-exact FIFO ordering in tests.
    pub fn ramp(profile: AudioFormatProfile) -> Self {
        Self::new(profile, Signal::Ramp)
    }

    fn new(profile: AudioFormatProfile, signal: Signal) -> Self {
        Self {
            profile,
            signal,
            frame_pos: 0,
            paced: true,
            header_len: 0,
            blocks_left: None,
        }
    }

    /// Disables real-time pacing; blocks are produced as fast as they are
    /// requested.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Emulates a hardware framing header of `len` junk bytes per block.
    pub fn with_frame_header(mut self, len: usize) -> Self {
        self.header_len = len;
        self
    }

    /// Limits the source to `blocks` capture blocks, after which it reports
    /// exhaustion and the capture worker winds down.
    pub fn with_block_limit(mut self, blocks: u64) -> Self {
        self.blocks_left = Some(blocks);
        self
    }

    /// Duration of audio carried by one full capture block.
    fn block_duration(&self) -> Duration {
        let ms = self.profile.capture_block_bytes / self.profile.bytes_per_ms;
        Duration::from_millis(u64::from(ms))
    }

    fn sample_value(&self, frame: u64) -> i32 {
        match self.signal {
            Signal::Silence => 0,
            Signal::Sine { frequency } => {
                let t = frame as f64 / f64::from(self.profile.sample_rate);
                let v = (2.0 * std::f64::consts::PI * frequency * t).sin();
                // Quarter of 24-bit full scale, comfortably clip-free.
                (v * f64::from(1 << 21)) as i32
            }
            Signal::Ramp => frame as i32,
        }
    }

    /// Encodes one sample into its container at `out`, padding byte first
    /// for 24-in-32.
    fn encode_sample(&self, value: i32, out: &mut [u8]) {
        match self.profile.encoding.container_bytes() {
            2 => out[..2].copy_from_slice(&(value as i16).to_le_bytes()),
            _ => {
                let b = value.to_le_bytes();
                // Container layout: padding byte, then the 3 payload bytes
                // (or a full 4-byte sample for Pcm32).
                if self.profile.encoding.needs_repack() {
                    out[0] = 0;
                    out[1..4].copy_from_slice(&b[..3]);
                } else {
                    out[..4].copy_from_slice(&b);
                }
            }
        }
    }
}

impl CaptureSource for MockCaptureSource {
    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        if let Some(left) = self.blocks_left.as_mut() {
            if *left == 0 {
                return Err(SourceError::Exhausted);
            }
            *left -= 1;
        }

        if self.paced {
            std::thread::sleep(self.block_duration());
        }

        let header = self.header_len.min(buf.len());
        for b in &mut buf[..header] {
            *b = 0xEE;
        }

        let container = self.profile.encoding.container_bytes() as usize;
        let channels = self.profile.channels as usize;
        let frame_bytes = container * channels;
        let payload_len =
            (self.profile.capture_block_bytes as usize).min(buf.len() - header) / frame_bytes
                * frame_bytes;

        let mut offset = header;
        while offset + frame_bytes <= header + payload_len {
            let value = self.sample_value(self.frame_pos);
            for ch in 0..channels {
                let at = offset + ch * container;
                self.encode_sample(value, &mut buf[at..at + container]);
            }
            self.frame_pos += 1;
            offset += frame_bytes;
        }

        Ok(header + payload_len)
    }

    fn frame_header_len(&self) -> usize {
        self.header_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_24() -> AudioFormatProfile {
        AudioFormatProfile::new(32, 24).unwrap()
    }

    #[test]
    fn test_silence_block_is_zeroed() {
        let profile = profile_24();
        let mut mock = MockCaptureSource::silence(profile).unpaced();
        let mut buf = vec![0xFFu8; profile.capture_block_bytes as usize];

        let n = mock.read_block(&mut buf).unwrap();
        assert_eq!(n, profile.capture_block_bytes as usize);
        assert!(buf[..n].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sine_block_has_signal() {
        let profile = profile_24();
        let mut mock = MockCaptureSource::sine(profile, 440.0).unpaced();
        let mut buf = vec![0u8; profile.capture_block_bytes as usize];

        let n = mock.read_block(&mut buf).unwrap();
        assert!(buf[..n].iter().any(|&b| b != 0));
    }

    #[test]
    fn test_24_in_32_padding_byte_leads_each_container() {
        let profile = profile_24();
        let mut mock = MockCaptureSource::sine(profile, 997.0).unpaced();
        let mut buf = vec![0xFFu8; profile.capture_block_bytes as usize];

        let n = mock.read_block(&mut buf).unwrap();
        for container in buf[..n].chunks_exact(4) {
            assert_eq!(container[0], 0);
        }
    }

    #[test]
    fn test_frame_header_prefixes_block() {
        let profile = profile_24();
        let mut mock = MockCaptureSource::silence(profile)
            .unpaced()
            .with_frame_header(12);
        let mut buf = vec![0u8; profile.capture_block_bytes as usize];

        let n = mock.read_block(&mut buf).unwrap();
        assert_eq!(mock.frame_header_len(), 12);
        assert!(buf[..12].iter().all(|&b| b == 0xEE));
        assert!(buf[12..n].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_block_limit_exhausts() {
        let profile = profile_24();
        let mut mock = MockCaptureSource::silence(profile)
            .unpaced()
            .with_block_limit(2);
        let mut buf = vec![0u8; profile.capture_block_bytes as usize];

        assert!(mock.read_block(&mut buf).is_ok());
        assert!(mock.read_block(&mut buf).is_ok());
        assert!(matches!(
            mock.read_block(&mut buf),
            Err(SourceError::Exhausted)
        ));
    }

    #[test]
    fn test_16bit_block_size() {
        let profile = AudioFormatProfile::new(16, 16).unwrap();
        let mut mock = MockCaptureSource::ramp(profile).unpaced();
        let mut buf = vec![0u8; profile.capture_block_bytes as usize];

        let n = mock.read_block(&mut buf).unwrap();
        assert_eq!(n, profile.capture_block_bytes as usize);
    }
}
