//! Ordering and flow-control tests for the single-producer path
//!
//! These exercise the core protocol guarantees: in-order delivery, batch
//! framing, overrun prevention against a slow consumer, and timeout
//! notification when the ring goes quiet.

use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use parking_lot::Mutex;
use surge::{
    BatchEventProcessor,
    EventHandler,
    ProcessorHandle,
    RingBuffer,
    RingBufferConfig,
    WaitStrategyType,
};

#[derive(Default)]
struct TestEvent {
    value: u64,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct RecordingHandler {
    seen: Arc<Mutex<Vec<(i64, u64, bool)>>>,
    delay: Duration,
}

impl EventHandler<TestEvent> for RecordingHandler {
    fn on_event(&mut self, event: &TestEvent, sequence: i64, end_of_batch: bool) -> anyhow::Result<()> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.seen.lock().push((sequence, event.value, end_of_batch));
        Ok(())
    }
}

fn wait_until(handle: &ProcessorHandle, sequence: i64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.sequence().get() < sequence {
        assert!(Instant::now() < deadline, "consumer stalled before sequence {sequence}");
        thread::yield_now();
    }
}

fn start_consumer(
    ring: &Arc<RingBuffer<TestEvent>>,
    delay: Duration
) -> (ProcessorHandle, Arc<Mutex<Vec<(i64, u64, bool)>>>, thread::JoinHandle<()>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let barrier = ring.new_barrier(&[]);
    let mut processor = BatchEventProcessor::new(ring.clone(), barrier, RecordingHandler {
        seen: seen.clone(),
        delay,
    });
    ring.add_gating_sequences(&[processor.sequence()]);

    let handle = processor.handle();
    let join = thread::spawn(move || {
        processor.run().unwrap();
    });
    (handle, seen, join)
}

#[test]
fn test_small_ring_delivers_in_order_across_wraps() {
    init_tracing();

    // Capacity 4, seven events: the ring wraps once mid-stream
    let ring = Arc::new(
        RingBuffer::new(
            RingBufferConfig::new(4).unwrap().with_wait_strategy(WaitStrategyType::Yielding),
            TestEvent::default
        ).unwrap()
    );
    let (handle, seen, join) = start_consumer(&ring, Duration::ZERO);

    for value in 0..7u64 {
        ring.publish_event(|event, _| event.value = value);
    }

    wait_until(&handle, 6);
    handle.halt();
    join.join().unwrap();

    let seen = seen.lock();
    let sequences: Vec<i64> = seen.iter().map(|(s, _, _)| *s).collect();
    let values: Vec<u64> = seen.iter().map(|(_, v, _)| *v).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(values, vec![0, 1, 2, 3, 4, 5, 6]);

    // The final event closes whatever batch it arrived in
    assert!(seen.last().unwrap().2, "last event must carry the end-of-batch flag");
}

#[test]
fn test_producer_blocks_instead_of_overwriting() {
    init_tracing();

    // Capacity 2 with a consumer that takes 10ms per event: claims for the
    // third event onwards must wait for consumer progress.
    let ring = Arc::new(
        RingBuffer::new(
            RingBufferConfig::new(2).unwrap().with_wait_strategy(WaitStrategyType::Yielding),
            TestEvent::default
        ).unwrap()
    );
    let (handle, seen, join) = start_consumer(&ring, Duration::from_millis(10));

    let started = Instant::now();
    for value in 100..106u64 {
        ring.publish_event(|event, _| event.value = value);
    }
    let publish_elapsed = started.elapsed();

    wait_until(&handle, 5);
    handle.halt();
    join.join().unwrap();

    // No overwrite: every value arrives intact and in order
    let values: Vec<u64> = seen.lock().iter().map(|(_, v, _)| *v).collect();
    assert_eq!(values, vec![100, 101, 102, 103, 104, 105]);

    // The producer cannot have raced ahead of the 10ms-per-event consumer
    assert!(
        publish_elapsed >= Duration::from_millis(20),
        "producer finished in {publish_elapsed:?}, it never waited for the consumer"
    );
}

#[test]
fn test_prepublished_range_is_one_batch() {
    init_tracing();

    let ring = Arc::new(
        RingBuffer::new(
            RingBufferConfig::new(8).unwrap().with_wait_strategy(WaitStrategyType::Yielding),
            TestEvent::default
        ).unwrap()
    );

    // Publish the whole range before the consumer exists, so its first
    // barrier wake sees all five events at once.
    let high = ring.next_n(5).unwrap();
    ring.publish_range(0, high);

    let (handle, seen, join) = start_consumer(&ring, Duration::ZERO);
    wait_until(&handle, high);
    handle.halt();
    join.join().unwrap();

    let flags: Vec<bool> = seen.lock().iter().map(|(_, _, eob)| *eob).collect();
    assert_eq!(flags, vec![false, false, false, false, true]);
}

struct TimeoutCounter {
    timeouts: Arc<Mutex<u32>>,
}

impl EventHandler<TestEvent> for TimeoutCounter {
    fn on_event(&mut self, _event: &TestEvent, _sequence: i64, _eob: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_timeout(&mut self, _sequence: i64) -> anyhow::Result<()> {
        *self.timeouts.lock() += 1;
        Ok(())
    }
}

#[test]
fn test_idle_ring_raises_timeout_callbacks() {
    init_tracing();

    let ring = Arc::new(
        RingBuffer::new(
            RingBufferConfig::new(8)
                .unwrap()
                .with_wait_strategy(WaitStrategyType::TimeoutBlocking)
                .with_timeout(Duration::from_millis(10)),
            TestEvent::default
        ).unwrap()
    );

    let timeouts = Arc::new(Mutex::new(0u32));
    let barrier = ring.new_barrier(&[]);
    let mut processor = BatchEventProcessor::new(ring.clone(), barrier, TimeoutCounter {
        timeouts: timeouts.clone(),
    });
    ring.add_gating_sequences(&[processor.sequence()]);

    let handle = processor.handle();
    let join = thread::spawn(move || {
        processor.run().unwrap();
    });

    thread::sleep(Duration::from_millis(100));
    handle.halt();
    join.join().unwrap();

    assert!(*timeouts.lock() >= 1, "no timeout callback fired on an idle ring");
    assert_eq!(handle.sequence().get(), -1, "timeouts must not advance the sequence");
}
