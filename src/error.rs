//! Error types and handling for the Surge library

use thiserror::Error;

/// Result type alias for Surge operations
pub type Result<T> = std::result::Result<T, SurgeError>;

/// Main error type for the Surge library
#[derive(Error, Debug)]
pub enum SurgeError {
    /// The ring buffer cannot hold the requested number of slots right now.
    /// Returned by the non-blocking claim path; callers may retry later.
    #[error("insufficient capacity in ring buffer")]
    InsufficientCapacity,

    /// A sequence barrier was alerted while a consumer was waiting.
    /// Used internally to break consumers out of their wait loops.
    #[error("sequence barrier alerted")]
    Alert,

    /// A timeout-capable wait strategy exhausted its block interval.
    /// Routed to the handler's timeout callback, not surfaced to users.
    #[error("wait strategy timed out")]
    Timeout,

    /// An event processor was started while already running
    #[error("processor already running")]
    AlreadyRunning,

    /// Invalid configuration parameter
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Failure to spawn a host thread
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SurgeError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by retrying the operation
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientCapacity | Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SurgeError::config("test message");
        assert!(matches!(err, SurgeError::InvalidConfig { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_classification() {
        assert!(SurgeError::InsufficientCapacity.is_recoverable());
        assert!(SurgeError::Timeout.is_recoverable());
        assert!(!SurgeError::Alert.is_recoverable());
        assert!(!SurgeError::AlreadyRunning.is_recoverable());
    }
}
