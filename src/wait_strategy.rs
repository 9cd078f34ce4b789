//! Wait strategies for ring buffer consumers
//!
//! This module provides the policies by which a consumer waits for a target
//! sequence to become available. Each strategy trades latency against CPU
//! usage differently; all of them share one calling contract:
//!
//! - `wait_for` returns only when the dependent sequence has reached the
//!   target, or fails with `Alert` if the barrier was alerted during the
//!   wait, or with `Timeout` for the timeout-capable variants.
//! - The returned sequence is the dependent's current value at return and may
//!   exceed the target — consumers use the overshoot for batching.
//! - `signal_all_when_blocking` is called by producers at publish time and is
//!   a no-op for the busy-wait variants.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use parking_lot::{ Condvar, Mutex };

use crate::constants::{ DEFAULT_RETRIES, DEFAULT_SLEEP, SPIN_TRIES };
use crate::error::{ Result, SurgeError };
use crate::sequence::Sequence;

/// The sequence a consumer actually waits on: the producer cursor for a
/// first-stage consumer, or the minimum over the upstream consumers it
/// depends on.
pub enum DependentSequence {
    /// No upstream consumers; track the cursor directly
    Cursor(Arc<Sequence>),
    /// Gate on the slowest of a fixed group of upstream consumers
    Group(Box<[Arc<Sequence>]>),
}

impl DependentSequence {
    /// Current value of the dependency. Always a volatile read; wait
    /// strategies must never act on a stale dependent value.
    #[inline(always)]
    pub fn get(&self) -> i64 {
        match self {
            Self::Cursor(cursor) => cursor.get(),
            Self::Group(sequences) => {
                let mut minimum = i64::MAX;
                for sequence in sequences.iter() {
                    let value = sequence.get();
                    if value < minimum {
                        minimum = value;
                    }
                }
                minimum
            }
        }
    }
}

#[inline(always)]
pub(crate) fn check_alert(alert: &AtomicBool) -> Result<()> {
    if alert.load(Ordering::Acquire) {
        return Err(SurgeError::Alert);
    }
    Ok(())
}

/// Trait for wait strategies that determine how consumers wait for data
pub trait WaitStrategy: Send + Sync {
    /// Wait until `dependent.get() >= sequence` and return the dependent's
    /// value, which may exceed `sequence`.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        alert: &AtomicBool
    ) -> Result<i64>;

    /// Signal that new data is available. Called on every publish.
    fn signal_all_when_blocking(&self) {}
}

/// Busy spin wait strategy - lowest latency, highest CPU usage.
///
/// Spins unconditionally with a CPU pause hint. Will burn a full core while
/// waiting; use when latency matters more than anything else.
pub struct BusySpinWaitStrategy;

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        alert: &AtomicBool
    ) -> Result<i64> {
        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;
            std::hint::spin_loop();
        }
    }
}

/// Yielding wait strategy - balanced latency and CPU usage.
///
/// Spins for a fixed budget, then yields the time slice between re-checks.
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    pub fn new() -> Self {
        Self { spin_tries: SPIN_TRIES }
    }

    pub fn with_spin_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        alert: &AtomicBool
    ) -> Result<i64> {
        let mut counter = self.spin_tries;
        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;

            if counter > 0 {
                counter -= 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }
}

/// Sleeping wait strategy - quietest of the spin family.
///
/// Burns through a retry budget in two phases (spin, then yield), then parks
/// for a short interval between re-checks.
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep: Duration,
}

impl SleepingWaitStrategy {
    pub fn new() -> Self {
        Self::with_retries(DEFAULT_RETRIES, DEFAULT_SLEEP)
    }

    pub fn with_retries(retries: u32, sleep: Duration) -> Self {
        Self { retries, sleep }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        alert: &AtomicBool
    ) -> Result<i64> {
        let mut counter = self.retries;
        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;

            if counter > SPIN_TRIES {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(self.sleep);
            }
        }
    }
}

/// Blocking wait strategy - lowest CPU use.
///
/// Blocks on a condition variable until a producer publishes, then spins for
/// the dependent sequence. The condition only tracks the cursor; dependent
/// consumers are expected to be close behind it.
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condition: Condvar,
}

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condition: Condvar::new(),
        }
    }
}

impl Default for BlockingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        alert: &AtomicBool
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                check_alert(alert)?;
                self.condition.wait(&mut guard);
            }
        }

        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condition.notify_all();
    }
}

/// Blocking wait strategy with a bounded block interval.
///
/// Fails with `Timeout` once the budget elapses, which the batch processor
/// turns into the handler's timeout callback.
pub struct TimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condition: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condition: Condvar::new(),
            timeout,
        }
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        alert: &AtomicBool
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let deadline = Instant::now() + self.timeout;
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                check_alert(alert)?;
                let now = Instant::now();
                if now >= deadline {
                    return Err(SurgeError::Timeout);
                }
                self.condition.wait_for(&mut guard, deadline - now);
            }
        }

        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condition.notify_all();
    }
}

/// Blocking variant that only touches the mutex when a waiter is parked.
///
/// Publishers skip the lock entirely unless a consumer has raised the
/// "signal needed" flag, which cuts mutex traffic on busy rings.
pub struct LiteBlockingWaitStrategy {
    mutex: Mutex<()>,
    condition: Condvar,
    signal_needed: AtomicBool,
}

impl LiteBlockingWaitStrategy {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condition: Condvar::new(),
            signal_needed: AtomicBool::new(false),
        }
    }
}

impl Default for LiteBlockingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for LiteBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        alert: &AtomicBool
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            loop {
                self.signal_needed.store(true, Ordering::Release);
                if cursor.get() >= sequence {
                    break;
                }
                check_alert(alert)?;
                // Bounded wait: a publisher that found the flag still unset
                // skips the lock, so the park must be able to self-heal.
                self.condition.wait_for(&mut guard, Duration::from_millis(1));
                if cursor.get() >= sequence {
                    break;
                }
            }
        }

        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        if self.signal_needed.swap(false, Ordering::AcqRel) {
            let _guard = self.mutex.lock();
            self.condition.notify_all();
        }
    }
}

/// Phased backoff: spin, then yield, then hand over to a fallback strategy.
///
/// The spin and yield windows are wall-clock bounded, so the strategy adapts
/// to how long the ring has actually been idle.
pub struct PhasedBackoffWaitStrategy {
    spin_timeout: Duration,
    yield_timeout: Duration,
    fallback: Box<dyn WaitStrategy>,
}

impl PhasedBackoffWaitStrategy {
    const SPIN_TRIES: u32 = 10_000;

    pub fn new(spin_timeout: Duration, yield_timeout: Duration, fallback: Box<dyn WaitStrategy>) -> Self {
        Self {
            spin_timeout,
            yield_timeout: spin_timeout + yield_timeout,
            fallback,
        }
    }

    /// Backoff ending in a condition-variable block
    pub fn with_lock(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(spin_timeout, yield_timeout, Box::new(BlockingWaitStrategy::new()))
    }

    /// Backoff ending in short parks
    pub fn with_sleep(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(spin_timeout, yield_timeout, Box::new(SleepingWaitStrategy::new()))
    }
}

impl WaitStrategy for PhasedBackoffWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        alert: &AtomicBool
    ) -> Result<i64> {
        let mut start: Option<Instant> = None;
        let mut counter = Self::SPIN_TRIES;

        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;

            counter -= 1;
            if counter == 0 {
                match start {
                    None => start = Some(Instant::now()),
                    Some(started) => {
                        let elapsed = started.elapsed();
                        if elapsed > self.yield_timeout {
                            return self.fallback.wait_for(sequence, cursor, dependent, alert);
                        }
                        if elapsed > self.spin_timeout {
                            thread::yield_now();
                        }
                    }
                }
                counter = Self::SPIN_TRIES;
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        self.fallback.signal_all_when_blocking();
    }
}

/// Available wait strategies, selectable through [`crate::RingBufferConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategyType {
    /// Mutex + condition variable; lowest CPU use
    Blocking,
    /// As `Blocking` but bounded; enables periodic timeout callbacks
    TimeoutBlocking,
    /// Mutex only when a waiter is parked
    LiteBlocking,
    /// Spin budget, then yield
    Yielding,
    /// Spin, yield, then park
    Sleeping,
    /// Unconditional spin with CPU pause hint; lowest latency
    BusySpin,
    /// Spin, yield, then delegate to a sleeping fallback
    PhasedBackoff,
}

/// Factory for creating wait strategies
pub struct WaitStrategyFactory;

impl WaitStrategyFactory {
    /// Create a wait strategy from the given type and tunables
    pub fn create(
        strategy_type: WaitStrategyType,
        retries: u32,
        sleep: Duration,
        timeout: Duration
    ) -> Arc<dyn WaitStrategy> {
        match strategy_type {
            WaitStrategyType::Blocking => Arc::new(BlockingWaitStrategy::new()),
            WaitStrategyType::TimeoutBlocking => Arc::new(TimeoutBlockingWaitStrategy::new(timeout)),
            WaitStrategyType::LiteBlocking => Arc::new(LiteBlockingWaitStrategy::new()),
            WaitStrategyType::Yielding => Arc::new(YieldingWaitStrategy::with_spin_tries(retries)),
            WaitStrategyType::Sleeping => Arc::new(SleepingWaitStrategy::with_retries(retries, sleep)),
            WaitStrategyType::BusySpin => Arc::new(BusySpinWaitStrategy),
            WaitStrategyType::PhasedBackoff =>
                Arc::new(
                    PhasedBackoffWaitStrategy::with_sleep(
                        Duration::from_micros(1),
                        Duration::from_micros(1)
                    )
                ),
        }
    }

    /// Lowest latency, full core burn
    pub fn low_latency() -> Arc<dyn WaitStrategy> {
        Arc::new(BusySpinWaitStrategy)
    }

    /// Balanced latency and CPU usage
    pub fn balanced() -> Arc<dyn WaitStrategy> {
        Arc::new(YieldingWaitStrategy::new())
    }

    /// Lowest CPU use for background processing
    pub fn low_cpu() -> Arc<dyn WaitStrategy> {
        Arc::new(BlockingWaitStrategy::new())
    }
}
