//! Cursors: "I observed the log up to here" markers.
//!
//! A [`Cursor`] captures the identity of the last event a caller has folded
//! into its decision state. Passing it back inside a conditional append
//! asserts that no matching event was committed after it.
//!
//! The position field is authoritative for conflict checks; the timestamp
//! and transaction id travel along for diagnostics and outbox consumers.

use crate::event::{Position, StoredEvent, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical marker after which events are considered new.
///
/// Cursors are immutable value objects passed by value. The distinguished
/// [`Cursor::zero`] denotes "before the beginning": position 0, the Unix
/// epoch, transaction id `"0"`.
///
/// # Examples
///
/// ```
/// use dcb_core::cursor::Cursor;
///
/// let zero = Cursor::zero();
/// assert!(zero.is_zero());
/// assert_eq!(zero.position.get(), 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Authoritative for conflict checks: events with a strictly greater
    /// position are "after" this cursor.
    pub position: Position,
    /// Timestamp of the event this cursor points at.
    pub occurred_at: DateTime<Utc>,
    /// Commit unit of the event this cursor points at.
    pub transaction_id: TransactionId,
}

impl Cursor {
    /// The cursor before the first event.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            position: Position::ZERO,
            occurred_at: DateTime::UNIX_EPOCH,
            transaction_id: TransactionId::zero(),
        }
    }

    /// Create a cursor from explicit parts.
    #[must_use]
    pub const fn new(
        position: Position,
        occurred_at: DateTime<Utc>,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            position,
            occurred_at,
            transaction_id,
        }
    }

    /// The cursor of a stored event.
    #[must_use]
    pub fn from_event(event: &StoredEvent) -> Self {
        Self {
            position: event.position,
            occurred_at: event.occurred_at,
            transaction_id: event.transaction_id.clone(),
        }
    }

    /// Whether this is the "before the beginning" cursor.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.position == Position::ZERO
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({}@{})", self.position, self.transaction_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use std::collections::BTreeSet;

    #[test]
    fn zero_cursor_shape() {
        let zero = Cursor::zero();
        assert_eq!(zero.position, Position::ZERO);
        assert_eq!(zero.transaction_id.as_str(), "0");
        assert!(zero.is_zero());
    }

    #[test]
    fn from_event_copies_identity() {
        let event = StoredEvent {
            event_type: EventType::new("WalletOpened"),
            tags: BTreeSet::new(),
            data: Vec::new(),
            position: Position::new(7),
            occurred_at: Utc::now(),
            transaction_id: TransactionId::new("801"),
        };
        let cursor = Cursor::from_event(&event);
        assert_eq!(cursor.position, Position::new(7));
        assert_eq!(cursor.transaction_id, TransactionId::new("801"));
        assert!(!cursor.is_zero());
    }
}
