//! Sequence barrier
//!
//! A barrier is the consumer-side view of the ring: it combines the producer
//! cursor, the upstream consumer sequences this stage depends on, the shared
//! wait strategy and a sticky alert flag. Every consumer loop waits through
//! exactly one barrier.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;

use crate::error::{ Result, SurgeError };
use crate::sequence::Sequence;
use crate::sequencer::Sequencer;
use crate::wait_strategy::{ DependentSequence, WaitStrategy };

pub struct SequenceBarrier {
    wait_strategy: Arc<dyn WaitStrategy>,
    sequencer: Arc<dyn Sequencer>,
    cursor: Arc<Sequence>,
    dependent: DependentSequence,
    alerted: AtomicBool,
}

impl SequenceBarrier {
    /// Create a barrier gated on the given upstream sequences, or directly
    /// on the cursor when `dependents` is empty (first-stage consumer).
    pub fn new(sequencer: Arc<dyn Sequencer>, dependents: Vec<Arc<Sequence>>) -> Self {
        let cursor = sequencer.cursor();
        let dependent = if dependents.is_empty() {
            DependentSequence::Cursor(cursor.clone())
        } else {
            DependentSequence::Group(dependents.into_boxed_slice())
        };

        Self {
            wait_strategy: sequencer.wait_strategy(),
            cursor,
            dependent,
            sequencer,
            alerted: AtomicBool::new(false),
        }
    }

    /// Wait for `sequence` to be consumable.
    ///
    /// Returns the highest contiguously published sequence, which may exceed
    /// the requested one — consumers use the overshoot for batching. Fails
    /// with `Alert` when alerted and `Timeout` when the wait strategy's
    /// budget elapsed.
    pub fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available = self.wait_strategy.wait_for(
            sequence,
            &self.cursor,
            &self.dependent,
            &self.alerted
        )?;

        if available < sequence {
            return Ok(available);
        }

        // Multi-producer claim order can leave holes behind `available`
        Ok(self.sequencer.highest_published_sequence(sequence, available))
    }

    /// Highest sequence it is safe to read up to
    pub fn get_cursor(&self) -> i64 {
        self.sequencer.published_cursor()
    }

    /// True if the barrier has been alerted and not yet cleared
    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    /// Alert the consumers waiting on this barrier. The flag is sticky until
    /// [`clear_alert`](Self::clear_alert); blocked waiters are woken so they
    /// observe it.
    pub fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    /// Reset the alert flag
    pub fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    /// Fail with `Alert` if the barrier is alerted
    pub fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            return Err(SurgeError::Alert);
        }
        Ok(())
    }
}
