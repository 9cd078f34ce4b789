//! Event-side traits: factory, handler and work handler
//!
//! The ring buffer is generic over the user's event type. Slots are created
//! once at construction by an [`EventFactory`] and afterwards only mutated in
//! place, never re-allocated.

use std::sync::Arc;

use crate::sequence::Sequence;

/// Factory for pre-filling the ring buffer slots.
///
/// Called `buffer_size` times at construction. Blanket-implemented for any
/// `FnMut() -> E`, so a closure or `E::default` works directly.
pub trait EventFactory<E> {
    /// Create one slot instance
    fn new_instance(&mut self) -> E;
}

impl<E, F> EventFactory<E> for F where F: FnMut() -> E {
    fn new_instance(&mut self) -> E {
        self()
    }
}

/// Callback interface for a batch event processor.
///
/// `on_event` is mandatory; the remaining methods are optional capabilities
/// with no-op defaults. Handlers advertise a capability simply by overriding
/// the method — there is no downcasting involved.
pub trait EventHandler<E>: Send {
    /// Called for each published event, in sequence order.
    ///
    /// `end_of_batch` is true for exactly one event per barrier wake — the
    /// last of the range — so handlers can flush buffered work at batch
    /// boundaries. A returned error is routed to the installed exception
    /// handler and the processor advances past the event.
    fn on_event(&mut self, event: &E, sequence: i64, end_of_batch: bool) -> anyhow::Result<()>;

    /// Called once on the processor thread before the first event
    fn on_start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once on the processor thread after the loop exits
    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called before a batch is dispatched, with the number of events the
    /// processor is about to deliver.
    fn on_batch_start(&mut self, _batch_size: i64) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when a timeout-capable wait strategy elapsed with no new
    /// events. `sequence` is the handler's current progress.
    fn on_timeout(&mut self, _sequence: i64) -> anyhow::Result<()> {
        Ok(())
    }

    /// Hands the handler its own progress sequence so it can publish
    /// progress mid-event when it batches work asynchronously.
    fn set_sequence_callback(&mut self, _sequence: Arc<Sequence>) {}
}

/// Callback interface for a worker-pool member.
///
/// Unlike [`EventHandler`], a work handler sees only the events its worker
/// won the claim for; sequence bookkeeping stays inside the pool.
pub trait WorkHandler<E>: Send {
    /// Process one event. A returned error is routed to the exception
    /// handler; the worker still publishes its progress so peers are not
    /// blocked.
    fn on_event(&mut self, event: &E) -> anyhow::Result<()>;
}
