//! Exception handler plug-ins
//!
//! Handler failures never unwind through the processing loop; they are routed
//! into an [`ExceptionHandler`] sink so the loop can keep its sequence
//! invariants (counters never regress, a poisoned event is skipped exactly
//! once).

/// Sink for failures raised by user handlers.
pub trait ExceptionHandler<E>: Send + Sync {
    /// A handler failed while processing an event.
    ///
    /// `event` is `None` when the failure came from a timeout or batch-start
    /// callback, where no event is in flight.
    fn handle_event_exception(&self, error: anyhow::Error, sequence: i64, event: Option<&E>);

    /// The start notification failed
    fn handle_on_start_exception(&self, error: anyhow::Error);

    /// The shutdown notification failed
    fn handle_on_shutdown_exception(&self, error: anyhow::Error);
}

/// Default exception handler: log and re-raise fatally.
///
/// Applications that want to keep running substitute their own sink or
/// [`IgnoreExceptionHandler`].
pub struct FatalExceptionHandler;

impl<E> ExceptionHandler<E> for FatalExceptionHandler {
    fn handle_event_exception(&self, error: anyhow::Error, sequence: i64, _event: Option<&E>) {
        tracing::error!(sequence, %error, "handler failed while processing event");
        panic!("handler failed at sequence {sequence}: {error}");
    }

    fn handle_on_start_exception(&self, error: anyhow::Error) {
        tracing::error!(%error, "handler failed during start notification");
        panic!("handler failed during start notification: {error}");
    }

    fn handle_on_shutdown_exception(&self, error: anyhow::Error) {
        tracing::error!(%error, "handler failed during shutdown notification");
        panic!("handler failed during shutdown notification: {error}");
    }
}

/// Logs failures at warn level and lets the loop continue.
pub struct IgnoreExceptionHandler;

impl<E> ExceptionHandler<E> for IgnoreExceptionHandler {
    fn handle_event_exception(&self, error: anyhow::Error, sequence: i64, _event: Option<&E>) {
        tracing::warn!(sequence, %error, "ignoring handler failure");
    }

    fn handle_on_start_exception(&self, error: anyhow::Error) {
        tracing::warn!(%error, "ignoring start notification failure");
    }

    fn handle_on_shutdown_exception(&self, error: anyhow::Error) {
        tracing::warn!(%error, "ignoring shutdown notification failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    #[should_panic(expected = "handler failed at sequence 3")]
    fn test_fatal_handler_panics() {
        let handler = FatalExceptionHandler;
        ExceptionHandler::<u64>::handle_event_exception(&handler, anyhow!("boom"), 3, None);
    }

    #[test]
    fn test_ignore_handler_swallows() {
        let handler = IgnoreExceptionHandler;
        ExceptionHandler::<u64>::handle_event_exception(&handler, anyhow!("boom"), 3, Some(&9));
        ExceptionHandler::<u64>::handle_on_start_exception(&handler, anyhow!("boom"));
        ExceptionHandler::<u64>::handle_on_shutdown_exception(&handler, anyhow!("boom"));
    }
}
