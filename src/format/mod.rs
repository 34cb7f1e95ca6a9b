//! Wire-format helpers for the transmit path.
//!
//! The only conversion this pipeline performs is container compaction:
//! 24-bit samples captured in 32-bit containers are repacked to 3 bytes per
//! sample before they reach the USB endpoint. No resampling, no DSP.

mod repack;

pub use repack::{repack_24_in_32, repack_chunk};
