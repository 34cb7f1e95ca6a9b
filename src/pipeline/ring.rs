//! Bounded byte ring between the capture and transmit clock domains.
//!
//! A thin wrapper over `ringbuf`'s lock-free SPSC queue. The split halves
//! are the ownership story: exactly one [`RingWriter`] lives in the capture
//! context and exactly one [`RingReader`] lives in the transmit context.
//! Neither half is cloneable, so the single-producer/single-consumer
//! discipline is enforced structurally rather than by convention.

use std::time::{Duration, Instant};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Sleep granularity of the bounded-wait read.
const READ_POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Factory for one writer/reader pair over a fixed-capacity byte ring.
pub struct TransferRing;

impl TransferRing {
    /// Allocates an empty ring of `capacity` bytes and splits it.
    pub fn create(capacity: usize) -> (RingWriter, RingReader) {
        let ring = HeapRb::<u8>::new(capacity);
        let (producer, consumer) = ring.split();
        (
            RingWriter { producer, capacity },
            RingReader { consumer, capacity },
        )
    }
}

/// The capture side of the ring.
///
/// All operations are non-blocking and allocation-free, so they are safe to
/// call from a context that must never sleep (interrupt-priority capture
/// completion included).
pub struct RingWriter {
    producer: HeapProd<u8>,
    capacity: usize,
}

impl RingWriter {
    /// Writes as many bytes as fit without overwriting unread data.
    ///
    /// Returns the number of bytes accepted. A short count means the ring is
    /// full - an overrun - and the caller must surface that as a status
    /// event rather than retry; the unwritten tail is lost.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.producer.push_slice(bytes)
    }

    /// Bytes currently free for writing.
    pub fn free(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Bytes currently buffered.
    pub fn occupied(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Total ring capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The transmit side of the ring.
pub struct RingReader {
    consumer: HeapCons<u8>,
    capacity: usize,
}

impl RingReader {
    /// Reads up to `out.len()` bytes with a bounded wait.
    ///
    /// If fewer bytes than requested are available, polls until either the
    /// request is satisfied or `timeout` elapses, then returns whatever was
    /// read. A zero timeout degenerates to a single non-blocking pass, the
    /// right policy for a transmit callback that must not stall. A short
    /// count after the wait is an underrun.
    pub fn read(&mut self, out: &mut [u8], timeout: Duration) -> usize {
        let mut filled = self.consumer.pop_slice(out);
        if filled == out.len() || timeout.is_zero() {
            return filled;
        }

        let deadline = Instant::now() + timeout;
        while filled < out.len() && Instant::now() < deadline {
            std::thread::sleep(READ_POLL_INTERVAL);
            filled += self.consumer.pop_slice(&mut out[filled..]);
        }
        filled
    }

    /// Bytes currently buffered.
    pub fn occupied(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Whether occupancy has reached the given trigger level.
    pub fn reached(&self, trigger: usize) -> bool {
        self.occupied() >= trigger
    }

    /// Discards all buffered data, returning the number of bytes dropped.
    ///
    /// Only advances the read cursor, so it stays SPSC-safe against a
    /// concurrent writer; bytes written during the reset may survive it.
    pub fn reset(&mut self) -> usize {
        self.consumer.clear()
    }

    /// Total ring capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_order() {
        let (mut writer, mut reader) = TransferRing::create(64);
        let data: Vec<u8> = (0..48).collect();

        assert_eq!(writer.write(&data), 48);

        let mut out = [0u8; 48];
        assert_eq!(reader.read(&mut out, Duration::ZERO), 48);
        assert_eq!(&out[..], &data[..]);
    }

    #[test]
    fn test_short_write_when_full() {
        let (mut writer, _reader) = TransferRing::create(16);
        assert_eq!(writer.write(&[0u8; 10]), 10);
        // Only 6 bytes of space remain; the rest of this write is lost.
        assert_eq!(writer.write(&[1u8; 10]), 6);
        assert_eq!(writer.free(), 0);
    }

    #[test]
    fn test_write_never_overwrites_unread_data() {
        let (mut writer, mut reader) = TransferRing::create(8);
        writer.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
        writer.write(&[9, 9, 9]);

        let mut out = [0u8; 8];
        reader.read(&mut out, Duration::ZERO);
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_short_read_after_timeout() {
        let (mut writer, mut reader) = TransferRing::create(64);
        writer.write(&[7u8; 10]);

        let mut out = [0u8; 20];
        let start = Instant::now();
        let n = reader.read(&mut out, Duration::from_millis(5));
        assert_eq!(n, 10);
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert_eq!(&out[..10], &[7u8; 10]);
    }

    #[test]
    fn test_zero_timeout_returns_immediately() {
        let (_writer, mut reader) = TransferRing::create(64);
        let mut out = [0u8; 16];
        assert_eq!(reader.read(&mut out, Duration::ZERO), 0);
    }

    #[test]
    fn test_bounded_wait_completes_when_writer_catches_up() {
        let (mut writer, mut reader) = TransferRing::create(256);
        writer.write(&[1u8; 32]);

        let feeder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(2));
            writer.write(&[2u8; 32]);
            writer
        });

        let mut out = [0u8; 64];
        let n = reader.read(&mut out, Duration::from_millis(100));
        assert_eq!(n, 64);
        assert_eq!(&out[..32], &[1u8; 32]);
        assert_eq!(&out[32..], &[2u8; 32]);
        feeder.join().unwrap();
    }

    #[test]
    fn test_reset_discards_buffered_data() {
        let (mut writer, mut reader) = TransferRing::create(64);
        writer.write(&[5u8; 40]);
        assert_eq!(reader.reset(), 40);
        assert_eq!(reader.occupied(), 0);
        assert_eq!(writer.free(), 64);
    }

    #[test]
    fn test_trigger_observation() {
        let (mut writer, reader) = TransferRing::create(64);
        assert!(!reader.reached(32));
        writer.write(&[0u8; 31]);
        assert!(!reader.reached(32));
        writer.write(&[0u8; 1]);
        assert!(reader.reached(32));
    }

    #[test]
    fn test_wraparound_preserves_fifo_order() {
        let (mut writer, mut reader) = TransferRing::create(8);
        let mut out = [0u8; 6];

        writer.write(&[1, 2, 3, 4, 5, 6]);
        reader.read(&mut out, Duration::ZERO);

        // Second write wraps around the end of the backing buffer.
        writer.write(&[7, 8, 9, 10, 11, 12]);
        reader.read(&mut out, Duration::ZERO);
        assert_eq!(out, [7, 8, 9, 10, 11, 12]);
    }
}
