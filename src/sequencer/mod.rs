//! Slot-claiming sequencers
//!
//! A sequencer owns the producer side of the protocol: claiming contiguous
//! slot indices, enforcing the capacity bound against the slowest consumer,
//! and making published sequences visible. Two variants exist:
//!
//! - [`SingleProducerSequencer`] — one writer thread, plain claim counters,
//!   a cached gating value to amortize the min-of-consumers scan.
//! - [`MultiProducerSequencer`] — CAS claim for concurrent writers plus a
//!   per-slot availability table, because claim order no longer equals
//!   publish order.

pub mod single;
pub mod multi;

pub use single::SingleProducerSequencer;
pub use multi::MultiProducerSequencer;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ Result, SurgeError };
use crate::sequence::{ minimum_sequence, Sequence };
use crate::wait_strategy::WaitStrategy;

/// Producer-side sequencing protocol shared by both variants
pub trait Sequencer: Send + Sync {
    /// Ring capacity in slots
    fn buffer_size(&self) -> usize;

    /// Claim the next sequence, spinning until capacity is available
    fn next(&self) -> i64;

    /// Claim the next `n` sequences (1 ≤ n ≤ buffer size), spinning until
    /// capacity is available. Returns the highest claimed sequence.
    fn next_n(&self, n: usize) -> Result<i64>;

    /// Claim the next sequence without blocking
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim the next `n` sequences without blocking. Fails with
    /// `InsufficientCapacity` when the ring is too full.
    fn try_next_n(&self, n: usize) -> Result<i64>;

    /// Make a claimed sequence visible to consumers
    fn publish(&self, sequence: i64);

    /// Make a contiguous claimed range visible to consumers
    fn publish_range(&self, low: i64, high: i64);

    /// True if the given sequence has been published
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence in `[lower_bound, available]` that can be read
    /// contiguously. Multi-producer claim order can leave holes; consumers
    /// must not read past the first one.
    fn highest_published_sequence(&self, lower_bound: i64, available: i64) -> i64;

    /// Highest contiguously published sequence
    fn published_cursor(&self) -> i64;

    /// The cursor sequence owned by this sequencer
    fn cursor(&self) -> Arc<Sequence>;

    /// The wait strategy consumers of this ring share
    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    /// Register consumer sequences that bound producer progress
    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]);

    /// Remove a gating sequence; returns true if it was registered
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Number of slots a producer could claim right now
    fn remaining_capacity(&self) -> i64;

    /// True if `required` slots could be claimed without blocking
    fn has_available_capacity(&self, required: usize) -> bool;
}

/// Shared, registration-safe set of gating sequences.
///
/// Registration and removal are rare control-plane operations; the hot path
/// only takes the read lock when a capacity cache went stale.
pub(crate) struct GatingSequences {
    sequences: RwLock<Vec<Arc<Sequence>>>,
}

impl GatingSequences {
    pub fn new() -> Self {
        Self {
            sequences: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, sequences: &[Arc<Sequence>]) {
        let mut guard = self.sequences.write();
        for sequence in sequences {
            guard.push(sequence.clone());
        }
    }

    pub fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        let mut guard = self.sequences.write();
        let before = guard.len();
        guard.retain(|candidate| !Arc::ptr_eq(candidate, sequence));
        guard.len() != before
    }

    /// Minimum over the registered sequences, or `fallback` when none are
    /// registered yet.
    pub fn minimum(&self, fallback: i64) -> i64 {
        minimum_sequence(&self.sequences.read(), fallback)
    }
}

/// Validate a claim size against the ring capacity
pub(crate) fn check_claim_size(n: usize, buffer_size: usize) -> Result<i64> {
    if n < 1 {
        return Err(SurgeError::config("claim size must be at least 1"));
    }
    if n > buffer_size {
        return Err(SurgeError::config("claim size must not exceed the buffer size"));
    }
    Ok(n as i64)
}

/// Validate a ring capacity
pub(crate) fn check_buffer_size(buffer_size: usize) -> Result<()> {
    if buffer_size < 1 {
        return Err(SurgeError::config("buffer size must be at least 1"));
    }
    if !buffer_size.is_power_of_two() {
        return Err(SurgeError::config("buffer size must be a power of 2"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_claim_size() {
        assert!(check_claim_size(0, 8).is_err());
        assert!(check_claim_size(9, 8).is_err());
        assert_eq!(check_claim_size(8, 8).unwrap(), 8);
    }

    #[test]
    fn test_check_buffer_size() {
        assert!(check_buffer_size(0).is_err());
        assert!(check_buffer_size(3).is_err());
        assert!(check_buffer_size(1).is_ok());
        assert!(check_buffer_size(1024).is_ok());
    }

    #[test]
    fn test_gating_set_add_remove() {
        let gating = GatingSequences::new();
        let a = Arc::new(Sequence::new(3));
        let b = Arc::new(Sequence::new(7));

        assert_eq!(gating.minimum(99), 99);

        gating.add(&[a.clone(), b.clone()]);
        assert_eq!(gating.minimum(99), 3);

        assert!(gating.remove(&a));
        assert!(!gating.remove(&a));
        assert_eq!(gating.minimum(99), 7);
    }
}
