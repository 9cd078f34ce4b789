//! Surge core constants
//!
//! Tuning values shared by the sequencers, wait strategies and ring buffer.

use std::time::Duration;

/// Default ring buffer size (must be power of 2)
pub const DEFAULT_RING_BUFFER_SIZE: usize = 64 * 1024;

/// Cache line size for alignment (64 bytes on most CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

/// Padding granularity for hot sequence counters.
///
/// Two cache lines, because modern Intel prefetchers pull adjacent line
/// pairs and would otherwise re-introduce false sharing.
pub const SEQUENCE_PADDING: usize = 2 * CACHE_LINE_SIZE;

/// Sequence value meaning "no entry has been claimed or published yet"
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Spin budget before a yielding consumer starts giving up its time slice
pub const SPIN_TRIES: u32 = 100;

/// Default retry budget for the sleeping wait strategy
pub const DEFAULT_RETRIES: u32 = 200;

/// Default park interval once the sleeping wait strategy runs out of retries
pub const DEFAULT_SLEEP: Duration = Duration::from_nanos(100);

/// Default block interval for the timeout-capable blocking wait strategy
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_millis(10);

/// Default number of slots claimed by the convenience batch claim
pub const DEFAULT_CLAIM_BATCH_SIZE: usize = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_size_is_power_of_two() {
        assert!(DEFAULT_RING_BUFFER_SIZE.is_power_of_two());
    }

    #[test]
    fn test_sequence_padding_covers_two_lines() {
        assert!(CACHE_LINE_SIZE.is_power_of_two());
        assert_eq!(SEQUENCE_PADDING, 128);
    }
}
