//! Batch event processor
//!
//! The single-threaded consumer loop: wait on the barrier, dispatch the
//! ready range to the handler with batch framing, advance the owned
//! sequence. The processor itself moves onto its host thread; control from
//! outside goes through a cloneable [`ProcessorHandle`].

use std::sync::atomic::{ AtomicU8, Ordering };
use std::sync::Arc;

use crate::barrier::SequenceBarrier;
use crate::error::{ Result, SurgeError };
use crate::event::EventHandler;
use crate::exception::{ ExceptionHandler, FatalExceptionHandler };
use crate::ring_buffer::RingBuffer;
use crate::sequence::Sequence;

const IDLE: u8 = 0;
const HALTED: u8 = 1;
const RUNNING: u8 = 2;

pub struct BatchEventProcessor<E, H: EventHandler<E>> {
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier>,
    handler: H,
    sequence: Arc<Sequence>,
    running: Arc<AtomicU8>,
    exception_handler: Arc<dyn ExceptionHandler<E>>,
}

/// Cloneable control surface for a processor that has moved onto its thread
#[derive(Clone)]
pub struct ProcessorHandle {
    running: Arc<AtomicU8>,
    barrier: Arc<SequenceBarrier>,
    sequence: Arc<Sequence>,
}

impl ProcessorHandle {
    /// Ask the processor to stop after the event it is currently handling.
    /// Idempotent; also wakes a processor parked in its wait strategy.
    pub fn halt(&self) {
        self.running.store(HALTED, Ordering::SeqCst);
        self.barrier.alert();
    }

    /// True while the processing loop is live
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) == RUNNING
    }

    /// The processor's progress sequence
    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.clone()
    }
}

impl<E, H> BatchEventProcessor<E, H> where E: Send + Sync, H: EventHandler<E> {
    pub fn new(ring: Arc<RingBuffer<E>>, barrier: SequenceBarrier, mut handler: H) -> Self {
        let sequence = Arc::new(Sequence::default());
        handler.set_sequence_callback(sequence.clone());

        Self {
            ring,
            barrier: Arc::new(barrier),
            handler,
            sequence,
            running: Arc::new(AtomicU8::new(IDLE)),
            exception_handler: Arc::new(FatalExceptionHandler),
        }
    }

    /// Replace the default fatal exception handler. Must be called before
    /// the processor is started.
    pub fn set_exception_handler(&mut self, exception_handler: Arc<dyn ExceptionHandler<E>>) {
        self.exception_handler = exception_handler;
    }

    /// The processor's progress sequence; register it as a gating sequence
    /// on the ring before producing.
    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.clone()
    }

    /// Control surface usable after the processor moved onto its thread
    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle {
            running: self.running.clone(),
            barrier: self.barrier.clone(),
            sequence: self.sequence.clone(),
        }
    }

    /// Run the processing loop on the calling thread until halted.
    ///
    /// Fails with `AlreadyRunning` if the processor is live on another
    /// thread. A processor halted before it ever ran performs the
    /// start/shutdown notification pair and returns.
    pub fn run(&mut self) -> Result<()> {
        match self.running.compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => {}
            Err(RUNNING) => {
                return Err(SurgeError::AlreadyRunning);
            }
            Err(_) => {
                // Halted before it ever started: notify and bail out
                self.notify_start();
                self.notify_shutdown();
                self.running.store(IDLE, Ordering::SeqCst);
                return Ok(());
            }
        }

        self.barrier.clear_alert();
        self.notify_start();

        if self.running.load(Ordering::SeqCst) == RUNNING {
            self.process_events();
        }

        self.notify_shutdown();
        self.running.store(IDLE, Ordering::SeqCst);
        Ok(())
    }

    fn process_events(&mut self) {
        let mut next_sequence = self.sequence.get() + 1;

        'next_batch: loop {
            match self.barrier.wait_for(next_sequence) {
                Ok(available) => {
                    if available >= next_sequence {
                        if let Err(error) = self.handler.on_batch_start(available - next_sequence + 1) {
                            self.exception_handler.handle_event_exception(error, next_sequence, None);
                        }
                    }

                    while next_sequence <= available {
                        // SAFETY: the barrier returned `available`, so every
                        // sequence up to it is published; our own gating
                        // sequence keeps producers from lapping the slot.
                        let event = unsafe { self.ring.get(next_sequence) };
                        let end_of_batch = next_sequence == available;

                        if let Err(error) = self.handler.on_event(event, next_sequence, end_of_batch) {
                            self.exception_handler.handle_event_exception(
                                error,
                                next_sequence,
                                Some(event)
                            );
                            // Advance past the poisoned event; counters never
                            // regress on an error path.
                            self.sequence.set(next_sequence);
                            next_sequence += 1;
                            continue 'next_batch;
                        }

                        next_sequence += 1;
                    }

                    self.sequence.set(available);
                }
                Err(SurgeError::Timeout) => {
                    self.notify_timeout(self.sequence.get());
                }
                Err(SurgeError::Alert) => {
                    if self.running.load(Ordering::SeqCst) != RUNNING {
                        break;
                    }
                }
                Err(error) => {
                    tracing::debug!(%error, "barrier wait failed, stopping processor");
                    break;
                }
            }
        }
    }

    fn notify_timeout(&mut self, sequence: i64) {
        if let Err(error) = self.handler.on_timeout(sequence) {
            self.exception_handler.handle_event_exception(error, sequence, None);
        }
    }

    fn notify_start(&mut self) {
        tracing::debug!("event processor starting");
        if let Err(error) = self.handler.on_start() {
            self.exception_handler.handle_on_start_exception(error);
        }
    }

    fn notify_shutdown(&mut self) {
        tracing::debug!("event processor shutting down");
        if let Err(error) = self.handler.on_shutdown() {
            self.exception_handler.handle_on_shutdown_exception(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::RingBufferConfig;
    use crate::wait_strategy::WaitStrategyType;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct TestEvent {
        value: u64,
    }

    struct Recorder {
        seen: Arc<Mutex<Vec<i64>>>,
    }

    impl EventHandler<TestEvent> for Recorder {
        fn on_event(&mut self, _event: &TestEvent, sequence: i64, _eob: bool) -> anyhow::Result<()> {
            self.seen.lock().push(sequence);
            Ok(())
        }
    }

    fn harness() -> (Arc<RingBuffer<TestEvent>>, BatchEventProcessor<TestEvent, Recorder>, Arc<Mutex<Vec<i64>>>) {
        let ring = Arc::new(
            RingBuffer::new(
                RingBufferConfig::new(8).unwrap().with_wait_strategy(WaitStrategyType::BusySpin),
                TestEvent::default
            ).unwrap()
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let barrier = ring.new_barrier(&[]);
        let processor = BatchEventProcessor::new(ring.clone(), barrier, Recorder {
            seen: seen.clone(),
        });
        ring.add_gating_sequences(&[processor.sequence()]);
        (ring, processor, seen)
    }

    #[test]
    fn test_halt_before_run_is_an_early_exit() {
        let (_ring, mut processor, seen) = harness();

        let handle = processor.handle();
        handle.halt();
        assert!(processor.run().is_ok());
        assert!(seen.lock().is_empty());
        assert!(!handle.is_running());
    }

    #[test]
    fn test_halt_is_idempotent() {
        let (_ring, processor, _seen) = harness();
        let handle = processor.handle();
        handle.halt();
        handle.halt();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_processes_prepublished_events_then_halts() {
        let (ring, mut processor, seen) = harness();
        let handle = processor.handle();

        for value in 0..5u64 {
            ring.publish_event(|event, _| event.value = value);
        }

        let worker = std::thread::spawn(move || {
            processor.run().unwrap();
        });

        while handle.sequence().get() < 4 {
            std::hint::spin_loop();
        }
        handle.halt();
        worker.join().unwrap();

        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }
}
