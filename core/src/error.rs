//! Error taxonomy for log and projection operations.
//!
//! The store never catches and swallows failures: every failure either
//! aborts the operation (with rollback inside a transaction) or is returned
//! as a value. Retries belong to the application layer.
//!
//! - [`EventLogError::ConcurrencyConflict`] is an *expected* outcome of a
//!   conditional append under contention: the caller re-projects,
//!   re-decides, and retries (or reports "state changed" upward).
//! - [`EventLogError::InvalidInput`] is a programmer-facing validation
//!   error, raised before any I/O.
//! - [`EventLogError::Storage`] is a transient infrastructure failure,
//!   propagated from the backing store.

use crate::event::Position;
use thiserror::Error;

/// Errors from event log operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventLogError {
    /// Caller bug: empty batch, empty event type name, or a vacuous
    /// idempotency criterion. Raised before any I/O.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The `state_changed` criterion matched at least one event committed
    /// after the caller's cursor. The decision is stale; re-project and
    /// retry.
    #[error("Concurrency conflict: {matching_count} event(s) matched the decision model after the cursor")]
    ConcurrencyConflict {
        /// How many committed events matched the criterion past the cursor.
        matching_count: u64,
        /// The earliest conflicting position, when the backend reports it.
        first_conflicting_position: Option<Position>,
    },

    /// The backing store failed. The message carries the backend's error;
    /// the caller's retry policy decides what happens next.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EventLogError {
    /// Whether this is a concurrency conflict (retryable by re-projecting).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, EventLogError>;

/// Errors from a projector's `transition` function.
///
/// Projectors surface their own failures (usually payload decode errors)
/// through this type; the projection engine attributes them to the
/// projector id when unwinding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransitionError(String);

impl TransitionError {
    /// Create a transition error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors from a projection run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// A projector raised during `transition`; the fold is unwound and the
    /// state past that event is undefined.
    #[error("Projector '{id}' failed: {source}")]
    Projector {
        /// The id of the failing projector.
        id: String,
        /// The underlying transition error.
        source: TransitionError,
    },

    /// The underlying scan failed.
    #[error(transparent)]
    Log(#[from] EventLogError),

    /// The caller's cancellation signal fired; the run stopped at a batch
    /// boundary.
    #[error("Projection cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_display_carries_count() {
        let error = EventLogError::ConcurrencyConflict {
            matching_count: 3,
            first_conflicting_position: Some(Position::new(42)),
        };
        assert!(error.is_conflict());
        assert!(format!("{error}").contains("3 event(s)"));
    }

    #[test]
    fn projector_error_names_the_projector() {
        let error = ProjectionError::Projector {
            id: "wallet-balance".to_string(),
            source: TransitionError::new("bad payload"),
        };
        let display = format!("{error}");
        assert!(display.contains("wallet-balance"));
        assert!(display.contains("bad payload"));
    }

    #[test]
    fn log_errors_convert_into_projection_errors() {
        let error: ProjectionError = EventLogError::Storage("down".to_string()).into();
        assert!(matches!(error, ProjectionError::Log(_)));
    }
}
