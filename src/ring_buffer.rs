//! Ring buffer façade
//!
//! Owns the pre-allocated slot array and one sequencer, and exposes the
//! producer/consumer entry points everything else is built from. Slots are
//! created once by the event factory and afterwards only re-owned through
//! the sequence protocol — never re-allocated.
//!
//! ## Example
//!
//! ```rust
//! use surge::{ RingBuffer, RingBufferConfig, ProducerType, WaitStrategyType };
//!
//! #[derive(Default)]
//! struct Tick { value: u64 }
//!
//! let config = RingBufferConfig::new(1024)
//!     .unwrap()
//!     .with_producer_type(ProducerType::Single)
//!     .with_wait_strategy(WaitStrategyType::Yielding);
//!
//! let ring = RingBuffer::new(config, Tick::default).unwrap();
//! let sequence = ring.publish_event(|tick, _seq| tick.value = 42);
//! assert!(ring.is_available(sequence));
//! ```

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BLOCK_TIMEOUT,
    DEFAULT_CLAIM_BATCH_SIZE,
    DEFAULT_RETRIES,
    DEFAULT_RING_BUFFER_SIZE,
    DEFAULT_SLEEP,
};
use crate::barrier::SequenceBarrier;
use crate::error::{ Result, SurgeError };
use crate::event::EventFactory;
use crate::sequence::Sequence;
use crate::sequencer::{ MultiProducerSequencer, Sequencer, SingleProducerSequencer };
use crate::wait_strategy::{ WaitStrategy, WaitStrategyFactory, WaitStrategyType };

/// Producer cardinality, selects the sequencer variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerType {
    /// One writer thread; fastest claim path
    Single,
    /// Concurrent writers; CAS claim plus availability tracking
    Multi,
}

/// Configuration for the ring buffer and its sequencer
#[derive(Debug, Clone)]
pub struct RingBufferConfig {
    /// Size of the ring buffer (must be power of 2)
    pub size: usize,
    /// Producer cardinality
    pub producer_type: ProducerType,
    /// Wait strategy for consumers
    pub wait_strategy: WaitStrategyType,
    /// Slots claimed by the convenience batch claim
    pub claim_batch_size: usize,
    /// Spin budget for the yielding/sleeping strategies
    pub retries: u32,
    /// Park interval for the sleeping strategy
    pub sleep: Duration,
    /// Block interval for the timeout-capable blocking strategy
    pub timeout: Duration,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_RING_BUFFER_SIZE,
            producer_type: ProducerType::Single,
            wait_strategy: WaitStrategyType::Blocking,
            claim_batch_size: DEFAULT_CLAIM_BATCH_SIZE,
            retries: DEFAULT_RETRIES,
            sleep: DEFAULT_SLEEP,
            timeout: DEFAULT_BLOCK_TIMEOUT,
        }
    }
}

impl RingBufferConfig {
    /// Create a new configuration with the specified size
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(SurgeError::config("ring buffer size must be greater than 0"));
        }
        if !size.is_power_of_two() {
            return Err(SurgeError::config("ring buffer size must be power of 2"));
        }

        Ok(Self {
            size,
            ..Default::default()
        })
    }

    /// Set the producer cardinality
    pub fn with_producer_type(mut self, producer_type: ProducerType) -> Self {
        self.producer_type = producer_type;
        self
    }

    /// Set the wait strategy
    pub fn with_wait_strategy(mut self, strategy: WaitStrategyType) -> Self {
        self.wait_strategy = strategy;
        self
    }

    /// Set the number of slots the convenience batch claim takes
    pub fn with_claim_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(SurgeError::config("claim batch size must be greater than 0"));
        }
        if batch_size > self.size {
            return Err(SurgeError::config("claim batch size cannot exceed ring buffer size"));
        }

        self.claim_batch_size = batch_size;
        Ok(self)
    }

    /// Set the spin budget for the yielding/sleeping strategies
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the park interval for the sleeping strategy
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    /// Set the block interval for the timeout-capable blocking strategy
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Pre-allocated ring of event slots coordinated by a sequencer.
///
/// # Thread Safety
///
/// The slot array is the only bulk shared state and no lock protects it; the
/// sequencing protocol is the lock. A producer has exclusive write access to
/// a slot between claim and publish, consumers share read access between
/// publish and the slot's next lap.
pub struct RingBuffer<E> {
    slots: Box<[UnsafeCell<E>]>,
    mask: i64,
    sequencer: Arc<dyn Sequencer>,
    claim_batch_size: usize,
}

// SAFETY: slots are only written between claim and publish (exclusive by the
// sequencing protocol) and only read once published; the release/acquire
// pairing on the cursor/availability table orders those accesses.
unsafe impl<E: Send> Send for RingBuffer<E> {}
unsafe impl<E: Send + Sync> Sync for RingBuffer<E> {}

impl<E> RingBuffer<E> {
    /// Create a ring buffer from a configuration, filling every slot from
    /// the factory.
    pub fn new(config: RingBufferConfig, factory: impl EventFactory<E>) -> Result<Self> {
        let wait_strategy = WaitStrategyFactory::create(
            config.wait_strategy,
            config.retries,
            config.sleep,
            config.timeout
        );

        let sequencer: Arc<dyn Sequencer> = match config.producer_type {
            ProducerType::Single =>
                Arc::new(SingleProducerSequencer::new(config.size, wait_strategy)?),
            ProducerType::Multi =>
                Arc::new(MultiProducerSequencer::new(config.size, wait_strategy)?),
        };

        Self::with_sequencer(sequencer, factory, config.claim_batch_size)
    }

    /// Create a single-producer ring with an explicit wait strategy
    pub fn single_producer(
        size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
        factory: impl EventFactory<E>
    ) -> Result<Self> {
        let sequencer = Arc::new(SingleProducerSequencer::new(size, wait_strategy)?);
        Self::with_sequencer(sequencer, factory, DEFAULT_CLAIM_BATCH_SIZE)
    }

    /// Create a multi-producer ring with an explicit wait strategy
    pub fn multi_producer(
        size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
        factory: impl EventFactory<E>
    ) -> Result<Self> {
        let sequencer = Arc::new(MultiProducerSequencer::new(size, wait_strategy)?);
        Self::with_sequencer(sequencer, factory, DEFAULT_CLAIM_BATCH_SIZE)
    }

    fn with_sequencer(
        sequencer: Arc<dyn Sequencer>,
        mut factory: impl EventFactory<E>,
        claim_batch_size: usize
    ) -> Result<Self> {
        let size = sequencer.buffer_size();
        let slots = (0..size)
            .map(|_| UnsafeCell::new(factory.new_instance()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            slots,
            mask: (size - 1) as i64,
            sequencer,
            claim_batch_size,
        })
    }

    /// Ring capacity in slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    fn index(&self, sequence: i64) -> usize {
        (sequence & self.mask) as usize
    }

    /// Read the event at `sequence`.
    ///
    /// # Safety
    ///
    /// The caller must have observed `sequence` as published (through a
    /// barrier wait or `is_available`), and the slot must not have been
    /// lapped — i.e. the caller's gating sequence keeps producers away.
    pub unsafe fn get(&self, sequence: i64) -> &E {
        &*self.slots[self.index(sequence)].get()
    }

    /// Mutable access to the event at `sequence`.
    ///
    /// # Safety
    ///
    /// The caller must have claimed `sequence` from the sequencer and not
    /// yet published it; the claim grants exclusive write access to the slot.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut E {
        &mut *self.slots[self.index(sequence)].get()
    }

    /// Claim the next slot, spinning until capacity is available
    pub fn next(&self) -> i64 {
        self.sequencer.next()
    }

    /// Claim the next `n` slots; returns the highest claimed sequence
    pub fn next_n(&self, n: usize) -> Result<i64> {
        self.sequencer.next_n(n)
    }

    /// Claim the configured convenience batch; returns `(low, high)`
    pub fn next_batch(&self) -> Result<(i64, i64)> {
        let high = self.sequencer.next_n(self.claim_batch_size)?;
        Ok((high - (self.claim_batch_size as i64) + 1, high))
    }

    /// Claim the next slot without blocking
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    /// Claim the next `n` slots without blocking
    pub fn try_next_n(&self, n: usize) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    /// Publish a claimed sequence
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Publish a claimed contiguous range
    pub fn publish_range(&self, low: i64, high: i64) {
        self.sequencer.publish_range(low, high);
    }

    /// Claim one slot, fill it through the translator and publish it.
    /// Spins while the ring is full. Returns the published sequence.
    pub fn publish_event<F>(&self, translator: F) -> i64 where F: FnOnce(&mut E, i64) {
        let sequence = self.sequencer.next();
        // SAFETY: `sequence` was just claimed and is not yet published
        translator(unsafe { self.get_mut(sequence) }, sequence);
        self.sequencer.publish(sequence);
        sequence
    }

    /// As [`publish_event`](Self::publish_event) but fails with
    /// `InsufficientCapacity` instead of spinning.
    pub fn try_publish_event<F>(&self, translator: F) -> Result<i64> where F: FnOnce(&mut E, i64) {
        let sequence = self.sequencer.try_next()?;
        // SAFETY: `sequence` was just claimed and is not yet published
        translator(unsafe { self.get_mut(sequence) }, sequence);
        self.sequencer.publish(sequence);
        Ok(sequence)
    }

    /// True if the given sequence has been published
    pub fn is_available(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// Highest contiguously published sequence
    pub fn cursor(&self) -> i64 {
        self.sequencer.published_cursor()
    }

    /// Number of slots a producer could claim right now
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// Register consumer sequences that bound producer progress
    pub fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(sequences);
    }

    /// Remove a gating sequence; returns true if it was registered
    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Create a barrier for a consumer gated on the given upstream
    /// sequences, or on the cursor when `dependents` is empty.
    pub fn new_barrier(&self, dependents: &[Arc<Sequence>]) -> SequenceBarrier {
        SequenceBarrier::new(self.sequencer.clone(), dependents.to_vec())
    }
}
