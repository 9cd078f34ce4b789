//! Surge - High-performance in-process event exchange
//!
//! A lock-free exchange built around a pre-allocated ring buffer of fixed
//! power-of-two capacity. Producers claim contiguous slot indices, fill
//! event objects in place and publish; consumers traverse the same slots in
//! order, individually or as coordinated worker pools. Progress is
//! coordinated through monotonically increasing 64-bit sequence counters
//! rather than locks.
//!
//! ## Key Features
//!
//! - **Pre-allocated slots**: no per-event allocation, no unbounded queues
//! - **Lock-free progress**: claim/publish/observe via release/acquire
//!   ordered sequence counters
//! - **Cache-line isolation**: padded counters, no false sharing
//! - **Batch amortization**: consumers drain every published event per wake
//! - **Pluggable wait strategies**: from busy-spin to blocking
//!
//! ## Architecture
//!
//! Producer → `Sequencer::next()` claims slot n → producer fills
//! `slot[n & mask]` → `publish(n)` makes it visible → a consumer's
//! `SequenceBarrier::wait_for(n)` observes it → handler runs → the
//! consumer's own `Sequence` advances and gates further producers.

pub mod constants;
pub mod error;
pub mod sequence;
pub mod event;
pub mod exception;
pub mod wait_strategy;
pub mod sequencer;
pub mod barrier;
pub mod ring_buffer;
pub mod processor;
pub mod worker_pool;
pub mod executor;

// Re-export main components
pub use error::{ Result, SurgeError };
pub use sequence::{ minimum_sequence, Sequence };
pub use event::{ EventFactory, EventHandler, WorkHandler };
pub use exception::{ ExceptionHandler, FatalExceptionHandler, IgnoreExceptionHandler };
pub use wait_strategy::{
    BlockingWaitStrategy,
    BusySpinWaitStrategy,
    DependentSequence,
    LiteBlockingWaitStrategy,
    PhasedBackoffWaitStrategy,
    SleepingWaitStrategy,
    TimeoutBlockingWaitStrategy,
    WaitStrategy,
    WaitStrategyFactory,
    WaitStrategyType,
    YieldingWaitStrategy,
};
pub use sequencer::{ MultiProducerSequencer, Sequencer, SingleProducerSequencer };
pub use barrier::SequenceBarrier;
pub use ring_buffer::{ ProducerType, RingBuffer, RingBufferConfig };
pub use processor::{ BatchEventProcessor, ProcessorHandle };
pub use worker_pool::{ WorkProcessor, WorkerPool };
pub use executor::ThreadExecutor;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
