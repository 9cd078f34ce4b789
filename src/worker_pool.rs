//! Worker pool: competing consumers over one ring position
//!
//! N workers share a single `work_sequence`; each event index is won by
//! exactly one worker through a CAS, so distribution is exactly-once. Every
//! worker still exposes its own progress sequence, and the set of worker
//! sequences (plus the shared work sequence) gates the producers.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::thread;

use crate::barrier::SequenceBarrier;
use crate::error::{ Result, SurgeError };
use crate::event::WorkHandler;
use crate::exception::ExceptionHandler;
use crate::executor::ThreadExecutor;
use crate::ring_buffer::RingBuffer;
use crate::sequence::Sequence;

/// One member of a worker pool. Runs on its own host thread.
pub struct WorkProcessor<E, H: WorkHandler<E>> {
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier>,
    handler: H,
    sequence: Arc<Sequence>,
    work_sequence: Arc<Sequence>,
    running: Arc<AtomicBool>,
    exception_handler: Arc<dyn ExceptionHandler<E>>,
}

impl<E, H> WorkProcessor<E, H> where E: Send + Sync, H: WorkHandler<E> {
    fn new(
        ring: Arc<RingBuffer<E>>,
        barrier: Arc<SequenceBarrier>,
        handler: H,
        work_sequence: Arc<Sequence>,
        exception_handler: Arc<dyn ExceptionHandler<E>>
    ) -> Self {
        Self {
            ring,
            barrier,
            handler,
            sequence: Arc::new(Sequence::default()),
            work_sequence,
            running: Arc::new(AtomicBool::new(false)),
            exception_handler,
        }
    }

    /// This worker's progress sequence
    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.clone()
    }

    fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Win the next event index. Progress is published before the CAS so the
    /// gating view never goes backwards.
    fn claim_next(&self) -> i64 {
        loop {
            let next_sequence = self.work_sequence.get() + 1;
            self.sequence.set(next_sequence - 1);
            if self.work_sequence.compare_and_set(next_sequence - 1, next_sequence) {
                return next_sequence;
            }
        }
    }

    /// Claim-and-process loop. Each iteration CASes the shared work sequence
    /// forward; the winner waits for that specific index to be published and
    /// processes it. On a handler error the worker still publishes its
    /// progress so the rest of the pool is not blocked.
    pub fn run(&mut self) -> Result<()> {
        if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(SurgeError::AlreadyRunning);
        }
        self.barrier.clear_alert();

        let mut cached_available = i64::MIN;
        let mut next_sequence = self.claim_next();

        loop {
            if cached_available >= next_sequence {
                // SAFETY: the barrier reported this sequence as published
                // and the pool's sequences gate producers away from it.
                let event = unsafe { self.ring.get(next_sequence) };
                if let Err(error) = self.handler.on_event(event) {
                    self.exception_handler.handle_event_exception(error, next_sequence, Some(event));
                }
                next_sequence = self.claim_next();
            } else {
                match self.barrier.wait_for(next_sequence) {
                    Ok(available) => {
                        cached_available = available;
                    }
                    Err(SurgeError::Alert) => {
                        if !self.running.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    // A recoverable failure (timeout) just re-enters the wait
                    Err(error) if error.is_recoverable() => {}
                    Err(error) => {
                        tracing::debug!(%error, "barrier wait failed, stopping worker");
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Pool of competing consumers sharing one ring position
pub struct WorkerPool<E, H: WorkHandler<E>> {
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier>,
    work_sequence: Arc<Sequence>,
    processors: Option<Vec<WorkProcessor<E, H>>>,
    worker_sequences: Vec<Arc<Sequence>>,
    running_flags: Vec<Arc<AtomicBool>>,
    started: AtomicBool,
}

impl<E, H> WorkerPool<E, H>
    where E: Send + Sync + 'static, H: WorkHandler<E> + 'static
{
    /// Create a pool with one worker per handler. The caller registers
    /// [`worker_sequences`](Self::worker_sequences) as gating sequences on
    /// the ring before producing.
    pub fn new(
        ring: Arc<RingBuffer<E>>,
        exception_handler: Arc<dyn ExceptionHandler<E>>,
        handlers: Vec<H>
    ) -> Self {
        let work_sequence = Arc::new(Sequence::default());
        let barrier = Arc::new(ring.new_barrier(&[]));

        let processors: Vec<WorkProcessor<E, H>> = handlers
            .into_iter()
            .map(|handler| {
                WorkProcessor::new(
                    ring.clone(),
                    barrier.clone(),
                    handler,
                    work_sequence.clone(),
                    exception_handler.clone()
                )
            })
            .collect();

        let worker_sequences = processors
            .iter()
            .map(|processor| processor.sequence())
            .collect();
        let running_flags = processors
            .iter()
            .map(|processor| processor.running_flag())
            .collect();

        Self {
            ring,
            barrier,
            work_sequence,
            processors: Some(processors),
            worker_sequences,
            running_flags,
            started: AtomicBool::new(false),
        }
    }

    /// Sensible worker count for CPU-bound handlers
    pub fn default_worker_count() -> usize {
        num_cpus::get()
    }

    /// The sequences producers must gate on: every worker's progress plus
    /// the shared work sequence.
    pub fn worker_sequences(&self) -> Vec<Arc<Sequence>> {
        let mut sequences = self.worker_sequences.clone();
        sequences.push(self.work_sequence.clone());
        sequences
    }

    /// Launch every worker on the executor. Worker progress starts from the
    /// ring's current cursor.
    pub fn start(&mut self, executor: &ThreadExecutor) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SurgeError::AlreadyRunning);
        }

        let cursor = self.ring.cursor();
        self.work_sequence.set(cursor);

        let processors = self.processors.take().unwrap_or_default();
        for mut processor in processors {
            processor.sequence.set(cursor);
            executor.execute(move || {
                if let Err(error) = processor.run() {
                    tracing::error!(%error, "work processor failed to run");
                }
            })?;
        }

        Ok(())
    }

    /// Stop every worker after its in-flight event. Idempotent.
    pub fn halt(&self) {
        for flag in &self.running_flags {
            flag.store(false, Ordering::SeqCst);
        }
        self.barrier.alert();
    }

    /// Wait until every published event has been claimed, then halt
    pub fn drain_and_halt(&self) {
        let cursor = self.ring.cursor();
        while cursor > self.work_sequence.get() {
            thread::yield_now();
        }
        self.halt();
    }

    /// True while any worker loop is live
    pub fn is_running(&self) -> bool {
        self.running_flags.iter().any(|flag| flag.load(Ordering::SeqCst))
    }
}
