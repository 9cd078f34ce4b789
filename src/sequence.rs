//! Padded atomic sequence counter
//!
//! A `Sequence` marks progress through the ring. The producer cursor, every
//! consumer's progress counter and the worker pool's shared work sequence are
//! all instances of this type. Each one lives alone on a 128-byte aligned
//! block so that independent counters never share a cache line.

use std::fmt;
use std::sync::atomic::{ AtomicI64, Ordering };
use std::sync::Arc;

use static_assertions::const_assert_eq;

use crate::constants::{ INITIAL_CURSOR_VALUE, SEQUENCE_PADDING };

/// Cache-line padded 64-bit sequence counter.
///
/// Observed values are monotonically non-decreasing per writer. The initial
/// value is −1, meaning "no entry yet".
#[repr(C, align(128))]
pub struct Sequence {
    value: AtomicI64,
    _padding: [u8; SEQUENCE_PADDING - 8],
}

// The aligned block is exactly two cache lines; anything allocated next to a
// Sequence starts on a fresh line pair.
const_assert_eq!(std::mem::size_of::<Sequence>(), 128);
const_assert_eq!(std::mem::align_of::<Sequence>(), 128);

impl Sequence {
    /// Create a sequence with the given initial value
    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
            _padding: [0; SEQUENCE_PADDING - 8],
        }
    }

    /// Volatile read (acquire semantics)
    #[inline(always)]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Plain read, no ordering
    #[inline(always)]
    pub fn get_relaxed(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Volatile write (release semantics)
    #[inline(always)]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Plain write, no ordering. Used on fast publisher paths that are
    /// followed by a later fence.
    #[inline(always)]
    pub fn set_relaxed(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Write with a full store-load fence. The single-producer capacity
    /// check relies on this to expose producer progress before scanning the
    /// gating sequences.
    #[inline(always)]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically set the value to `new` if the current value equals
    /// `expected`. Returns true on success.
    #[inline(always)]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Atomically add one and return the updated value
    #[inline(always)]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Atomically add `n` and return the updated value
    #[inline(always)]
    pub fn add_and_get(&self, n: i64) -> i64 {
        self.value.fetch_add(n, Ordering::AcqRel) + n
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sequence").field(&self.get()).finish()
    }
}

/// Minimum over a set of sequences, or `fallback` if the set is empty.
///
/// Used for the producer gating check; the scan length equals the number of
/// terminal consumers, which is small.
pub fn minimum_sequence(sequences: &[Arc<Sequence>], fallback: i64) -> i64 {
    let mut minimum = fallback;
    for sequence in sequences {
        let value = sequence.get();
        if value < minimum {
            minimum = value;
        }
    }
    minimum
}
