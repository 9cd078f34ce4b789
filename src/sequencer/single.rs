//! Single-producer sequencer
//!
//! The fast variant: claim state lives in two counters only the producer
//! thread writes, so a claim is two plain loads, an addition and a plain
//! store on the happy path. The published cursor is the only shared write.
//!
//! Not safe for concurrent writers — use
//! [`MultiProducerSequencer`](super::MultiProducerSequencer) for that.

use std::sync::atomic::{ AtomicI64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::utils::Backoff;

use crate::error::{ Result, SurgeError };
use crate::sequence::Sequence;
use crate::sequencer::{ check_buffer_size, check_claim_size, GatingSequences, Sequencer };
use crate::wait_strategy::WaitStrategy;

pub struct SingleProducerSequencer {
    buffer_size: i64,
    cursor: Arc<Sequence>,
    gating: GatingSequences,
    wait_strategy: Arc<dyn WaitStrategy>,
    /// Last claimed sequence. Producer-thread only; relaxed atomics keep the
    /// type `Sync` without paying for ordering.
    next_value: AtomicI64,
    /// Last observed minimum of the gating sequences. Producer-thread only.
    cached_value: AtomicI64,
}

impl SingleProducerSequencer {
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        check_buffer_size(buffer_size)?;

        Ok(Self {
            buffer_size: buffer_size as i64,
            cursor: Arc::new(Sequence::default()),
            gating: GatingSequences::new(),
            wait_strategy,
            next_value: AtomicI64::new(-1),
            cached_value: AtomicI64::new(-1),
        })
    }

    /// Claim `n` slots, spinning until the wrap point clears the slowest
    /// gating sequence.
    fn claim(&self, n: i64) -> i64 {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.buffer_size;
        let cached = self.cached_value.load(Ordering::Relaxed);

        // `cached > next_value` is the stale-cache sentinel; it forces a real
        // scan instead of trusting a value from before a wrap.
        if wrap_point > cached || cached > next_value {
            // Expose claimed-so-far before scanning, so consumers observe
            // producer progress even while we wait for capacity.
            self.cursor.set_volatile(next_value);

            let backoff = Backoff::new();
            let mut minimum = self.gating.minimum(next_value);
            while wrap_point > minimum {
                if backoff.is_completed() {
                    thread::park_timeout(Duration::from_nanos(1));
                } else {
                    backoff.snooze();
                }
                minimum = self.gating.minimum(next_value);
            }

            self.cached_value.store(minimum, Ordering::Relaxed);
        }

        self.next_value.store(next_sequence, Ordering::Relaxed);
        next_sequence
    }

    /// Capacity probe shared by `try_next_n` and `has_available_capacity`
    fn has_capacity(&self, required: i64, store_cursor: bool) -> bool {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let wrap_point = (next_value + required) - self.buffer_size;
        let cached = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached || cached > next_value {
            if store_cursor {
                self.cursor.set_volatile(next_value);
            }

            let minimum = self.gating.minimum(next_value);
            self.cached_value.store(minimum, Ordering::Relaxed);

            if wrap_point > minimum {
                return false;
            }
        }

        true
    }
}

impl Sequencer for SingleProducerSequencer {
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

        if !self.has_capacity(n, true) {
            return Err(SurgeError::InsufficientCapacity);
        }

        let next_sequence = self.next_value.load(Ordering::Relaxed) + n;
        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn publish(&self, sequence: i64) {
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _low: i64, high: i64) {
        // The cursor jump atomically exposes the whole range
        self.publish(high);
    }

    fn is_available(&self, sequence: i64) -> bool {
        sequence <= self.cursor.get()
    }

    fn highest_published_sequence(&self, _lower_bound: i64, available: i64) -> i64 {
        // Claim order equals publish order for a single writer
        available
    }

    fn published_cursor(&self) -> i64 {
        self.cursor.get()
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
        let next_value = self.next_value.load(Ordering::Relaxed);
        let consumed = self.gating.minimum(next_value);
        self.buffer_size - (next_value - consumed)
    }

    fn has_available_capacity(&self, required: usize) -> bool {
        self.has_capacity(required as i64, false)
    }
}
