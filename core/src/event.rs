//! Event types: the input and stored representations of log entries.
//!
//! An [`AppendEvent`] is what a caller hands to the log: a type name, a set
//! of [`Tag`]s, and an opaque payload. A [`StoredEvent`] is what the log
//! hands back: the same three fields plus the commit-assigned [`Position`],
//! timestamp, and transaction id.
//!
//! The payload is a plain byte sequence. The store never parses it;
//! serialization is entirely the caller's concern.
//!
//! # Examples
//!
//! ```
//! use dcb_core::event::AppendEvent;
//! use dcb_core::tag::Tag;
//!
//! let event = AppendEvent::new("DepositMade")
//!     .with_tag(Tag::new("wallet", "w1").unwrap())
//!     .with_data(br#"{"amount":50}"#.to_vec());
//!
//! assert_eq!(event.event_type().as_str(), "DepositMade");
//! ```

use crate::tag::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An event type name, e.g. `"WalletOpened"`.
///
/// Type names are opaque strings to the store; there is no schema registry.
/// Emptiness is rejected at append time rather than here so that literals
/// can be used freely when building queries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    /// Create an event type name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is empty (invalid for appends).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A global position in the event log.
///
/// Positions are unique, strictly increasing, and gap-free; they start at 1.
/// `Position::ZERO` is not a valid event position - it is the cursor value
/// meaning "before the beginning".
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(u64);

impl Position {
    /// The position before the first event.
    pub const ZERO: Self = Self(0);

    /// Create a position from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The position immediately after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the commit unit that wrote an event.
///
/// Two events written in one unit share the same id and become visible
/// atomically. The value `"0"` belongs to the zero cursor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// The transaction id of the zero cursor.
    #[must_use]
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    /// Create a transaction id from an opaque string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event to be appended: type, tags, and opaque payload.
///
/// Tags are a set; adding a duplicate is a no-op. The payload defaults to
/// empty bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEvent {
    event_type: EventType,
    tags: BTreeSet<Tag>,
    data: Vec<u8>,
}

impl AppendEvent {
    /// Create an event of the given type with no tags and empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<EventType>) -> Self {
        Self {
            event_type: event_type.into(),
            tags: BTreeSet::new(),
            data: Vec::new(),
        }
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Add several tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Set the payload bytes.
    #[must_use]
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// The event type.
    #[must_use]
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// The tag set.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    /// The payload bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A committed event as read back from the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// The event type name.
    pub event_type: EventType,
    /// The tag set.
    pub tags: BTreeSet<Tag>,
    /// The opaque payload bytes.
    pub data: Vec<u8>,
    /// Commit-assigned global position (strictly positive).
    pub position: Position,
    /// Commit-assigned timestamp; non-decreasing with position.
    pub occurred_at: DateTime<Utc>,
    /// The commit unit that wrote this event.
    pub transaction_id: TransactionId,
}

impl fmt::Display for StoredEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoredEvent {{ position: {}, type: {}, tags: {}, size: {} bytes }}",
            self.position,
            self.event_type,
            self.tags.len(),
            self.data.len()
        )
    }
}
