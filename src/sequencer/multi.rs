//! Multi-producer sequencer
//!
//! Concurrent writers claim slots with a CAS on the shared cursor, which
//! makes claim order diverge from publish order: slot 7 can be published
//! while slot 6 is still being filled. A single cursor cannot express that,
//! so published slots are tracked in a per-slot availability table. The
//! entry at `sequence & mask` holds the round number
//! `sequence >> log2(buffer_size)` once that sequence is published; the
//! round marker changes every lap of the ring, which rules out ABA without
//! ever clearing the table.

use std::sync::atomic::{ AtomicI32, AtomicI64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::utils::Backoff;

use crate::error::{ Result, SurgeError };
use crate::sequence::Sequence;
use crate::sequencer::{ check_buffer_size, check_claim_size, GatingSequences, Sequencer };
use crate::wait_strategy::WaitStrategy;

pub struct MultiProducerSequencer {
    buffer_size: i64,
    /// Highest claimed sequence; publication is tracked per slot
    cursor: Arc<Sequence>,
    gating: GatingSequences,
    wait_strategy: Arc<dyn WaitStrategy>,
    /// Shared cache of the last observed minimum gating sequence
    gating_cache: AtomicI64,
    available: Box<[AtomicI32]>,
    index_mask: i64,
    index_shift: u32,
}

impl MultiProducerSequencer {
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        check_buffer_size(buffer_size)?;

        let available = (0..buffer_size)
            .map(|_| AtomicI32::new(-1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            buffer_size: buffer_size as i64,
            cursor: Arc::new(Sequence::default()),
            gating: GatingSequences::new(),
            wait_strategy,
            gating_cache: AtomicI64::new(-1),
            available,
            index_mask: (buffer_size - 1) as i64,
            index_shift: buffer_size.trailing_zeros(),
        })
    }

    #[inline(always)]
    fn calculate_index(&self, sequence: i64) -> usize {
        (sequence & self.index_mask) as usize
    }

    #[inline(always)]
    fn calculate_flag(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    fn set_available(&self, sequence: i64) {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_flag(sequence);
        self.available[index].store(flag, Ordering::Release);
    }

    /// CAS claim loop with the capacity check folded in
    fn claim(&self, n: i64) -> i64 {
        let backoff = Backoff::new();

        loop {
            let current = self.cursor.get();
            let next = current + n;
            let wrap_point = next - self.buffer_size;
            let cached = self.gating_cache.load(Ordering::Relaxed);

            // Same stale-cache sentinel as the single-producer variant
            if wrap_point > cached || cached > current {
                let minimum = self.gating.minimum(current);
                if wrap_point > minimum {
                    if backoff.is_completed() {
                        thread::park_timeout(Duration::from_nanos(1));
                    } else {
                        backoff.snooze();
                    }
                    continue;
                }
                self.gating_cache.store(minimum, Ordering::Relaxed);
            }

            // Capacity confirmed against `current`; the CAS still fails if
            // another producer moved the cursor in the meantime.
            if self.cursor.compare_and_set(current, next) {
                return next;
            }
        }
    }

    fn has_capacity_from(&self, cursor_value: i64, required: i64) -> bool {
        let wrap_point = (cursor_value + required) - self.buffer_size;
        let cached = self.gating_cache.load(Ordering::Relaxed);

        if wrap_point > cached || cached > cursor_value {
            let minimum = self.gating.minimum(cursor_value);
            self.gating_cache.store(minimum, Ordering::Relaxed);

            if wrap_point > minimum {
                return false;
            }
        }

        true
    }
}

impl Sequencer for MultiProducerSequencer {
    fn buffer_size(&self) -> usize {
        self.buffer_size as usize
    }

    fn next(&self) -> i64 {
        self.claim(1)
    }

    fn next_n(&self, n: usize) -> Result<i64> {
        let n = check_claim_size(n, self.buffer_size as usize)?;
        Ok(self.claim(n))
    }

    fn try_next_n(&self, n: usize) -> Result<i64> {
        let n = check_claim_size(n, self.buffer_size as usize)?;
        let backoff = Backoff::new();

        loop {
            let current = self.cursor.get();
            let next = current + n;

            if !self.has_capacity_from(current, n) {
                return Err(SurgeError::InsufficientCapacity);
            }
            if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
            backoff.spin();
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, low: i64, high: i64) {
        for sequence in low..=high {
            self.set_available(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_flag(sequence);
        self.available[index].load(Ordering::Acquire) == flag
    }

    fn highest_published_sequence(&self, lower_bound: i64, available: i64) -> i64 {
        for sequence in lower_bound..=available {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
        available
    }

    fn published_cursor(&self) -> i64 {
        let claimed = self.cursor.get();
        // Everything at or below the slowest consumer has been published;
        // scan only the window a producer can still be filling.
        let floor = self.gating.minimum(claimed);
        self.highest_published_sequence(floor + 1, claimed)
    }

    fn cursor(&self) -> Arc<Sequence> {
        self.cursor.clone()
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        self.wait_strategy.clone()
    }

    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.gating.add(sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.gating.remove(sequence)
    }

    fn remaining_capacity(&self) -> i64 {
        let claimed = self.cursor.get();
        let consumed = self.gating.minimum(claimed);
        self.buffer_size - (claimed - consumed)
    }

    fn has_available_capacity(&self, required: usize) -> bool {
        self.has_capacity_from(self.cursor.get(), required as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait_strategy::WaitStrategyFactory;
    use proptest::prelude::*;

    fn sequencer(size: usize) -> MultiProducerSequencer {
        MultiProducerSequencer::new(size, WaitStrategyFactory::low_latency()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_buffer_size() {
        assert!(MultiProducerSequencer::new(6, WaitStrategyFactory::low_latency()).is_err());
    }

    #[test]
    fn test_out_of_order_publish_leaves_a_hole() {
        let seq = sequencer(8);
        let gate = Arc::new(Sequence::default());
        seq.add_gating_sequences(&[gate]);

        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);

        // Publish the second claim first
        seq.publish(1);
        assert!(seq.is_available(1));
        assert!(!seq.is_available(0));
        assert_eq!(seq.highest_published_sequence(0, 1), -1);
        assert_eq!(seq.published_cursor(), -1);

        seq.publish(0);
        assert_eq!(seq.highest_published_sequence(0, 1), 1);
        assert_eq!(seq.published_cursor(), 1);
    }

    #[test]
    fn test_publish_range_marks_every_slot() {
        let seq = sequencer(8);
        let high = seq.next_n(4).unwrap();
        assert_eq!(high, 3);

        seq.publish_range(0, high);
        for sequence in 0..=high {
            assert!(seq.is_available(sequence));
        }
        assert_eq!(seq.highest_published_sequence(0, high), high);
    }

    #[test]
    fn test_round_marker_distinguishes_laps() {
        let seq = sequencer(4);
        let gate = Arc::new(Sequence::default());
        seq.add_gating_sequences(&[gate.clone()]);

        for sequence in 0..4 {
            assert_eq!(seq.next(), sequence);
            seq.publish(sequence);
        }
        gate.set(3);

        // Second lap lands in the same slots with a new round marker
        assert_eq!(seq.next(), 4);
        assert!(!seq.is_available(4));
        seq.publish(4);
        assert!(seq.is_available(4));
        // The marker for lap two is not confused with lap one
        assert!(!seq.is_available(8));
    }

    #[test]
    fn test_try_next_fails_when_full() {
        let seq = sequencer(2);
        let gate = Arc::new(Sequence::default());
        seq.add_gating_sequences(&[gate.clone()]);

        seq.publish(seq.try_next().unwrap());
        seq.publish(seq.try_next().unwrap());
        assert!(matches!(seq.try_next(), Err(SurgeError::InsufficientCapacity)));
        assert_eq!(seq.remaining_capacity(), 0);

        gate.set(1);
        assert_eq!(seq.try_next().unwrap(), 2);
        assert_eq!(seq.remaining_capacity(), 1);
    }

    proptest! {
        /// Slot reuse across laps must produce a different round marker for
        /// the same index, otherwise a consumer could read a stale lap.
        #[test]
        fn prop_round_marker_changes_per_lap(
            size_log2 in 0u32..10,
            sequence in 0i64..1_000_000,
        ) {
            let size = 1usize << size_log2;
            let seq = sequencer(size);

            let a = (seq.calculate_index(sequence), seq.calculate_flag(sequence));
            let next_lap = sequence + size as i64;
            let b = (seq.calculate_index(next_lap), seq.calculate_flag(next_lap));

            prop_assert_eq!(a.0, b.0);
            prop_assert_ne!(a.1, b.1);
        }
    }
}
