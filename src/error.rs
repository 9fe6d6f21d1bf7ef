//! Error types for the producer and consumer engines.

use std::time::Duration;
use thiserror::Error;

/// Error surfaced by a [`crate::transport::StreamTransport`] collaborator.
///
/// The transport itself (request signing, HTTP, credentials) is an external
/// collaborator out of scope for this crate; this type only needs to carry
/// enough information for the core to log and retry.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors returned directly from `write_producer` (not raised).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProducerWriteError {
    #[error("message too large: {len} characters (max {max})")]
    MessageTooLarge { len: usize, max: usize },
    #[error("producer queue is full")]
    QueueFull,
    #[error("producer queue is closed")]
    QueueClosed,
    /// Only returned by [`crate::producer::Producer::write_json`]; the
    /// template's `append_json` swallows this case silently, but this
    /// crate's `write` surface already returns errors rather than
    /// fire-and-forget, so serialization failures are surfaced the same way.
    #[error("failed to serialize message as JSON: {0}")]
    SerializationFailed(String),
}

/// Fatal producer conditions, raised rather than returned from `write_producer`.
#[derive(Debug, Clone, Error)]
pub enum ProducerError {
    #[error(transparent)]
    Write(#[from] ProducerWriteError),

    #[error("invalid concurrency: max_concurrency must be >= 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("producer worker died unexpectedly (cause: {})", .cause.as_deref().unwrap_or("unknown"))]
    WorkerDied { cause: Option<String> },

    #[error("producer cleanup timed out after {0:?}")]
    CleanupTimedOut(Duration),
}

/// Consumer construction errors. Background loops and read APIs never
/// surface errors upstream (they self-heal with a sleep-backoff per the
/// component design), so this enum only covers construction-time mistakes.
#[derive(Debug, Clone, Error)]
pub enum ConsumerError {
    #[error("invalid consumer configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_write_error_messages_are_stable() {
        assert_eq!(
            ProducerWriteError::MessageTooLarge { len: 10, max: 5 }.to_string(),
            "message too large: 10 characters (max 5)"
        );
        assert_eq!(ProducerWriteError::QueueFull.to_string(), "producer queue is full");
    }

    #[test]
    fn worker_died_falls_back_to_unknown_cause() {
        let err = ProducerError::WorkerDied { cause: None };
        assert_eq!(err.to_string(), "producer worker died unexpectedly (cause: unknown)");
    }

    #[test]
    fn producer_error_wraps_write_error_via_from() {
        let write_err = ProducerWriteError::QueueClosed;
        let err: ProducerError = write_err.into();
        assert!(matches!(err, ProducerError::Write(ProducerWriteError::QueueClosed)));
    }
}
