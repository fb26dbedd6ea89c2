//! Append conditions: the consistency contract of a conditional append.
//!
//! An [`AppendCondition`] tells the engine what must still be true for the
//! caller's decision to be valid at commit time:
//!
//! - [`AppendCondition::Unconditional`] - commit regardless (commutative
//!   operations such as deposits).
//! - [`AppendCondition::Conditional`] - commit only if no event matching
//!   `state_changed` was committed after `after_cursor`, optionally after an
//!   idempotency screen across the whole log.
//!
//! # Examples
//!
//! A decision invalidated by any new wallet event:
//!
//! ```
//! use dcb_core::condition::AppendCondition;
//! use dcb_core::cursor::Cursor;
//! use dcb_core::query::{Query, QueryItem};
//! use dcb_core::tag::Tag;
//!
//! let wallet = Tag::new("wallet", "w1").unwrap();
//! let condition = AppendCondition::after(Cursor::zero())
//!     .when_changed(Query::of(QueryItem::tagged(wallet)));
//! assert!(!condition.is_effectively_unconditional());
//! ```
//!
//! Create-or-return semantics for entity creation:
//!
//! ```
//! use dcb_core::condition::AppendCondition;
//! use dcb_core::query::QueryItem;
//! use dcb_core::tag::Tag;
//!
//! let criterion = QueryItem::of_type("WalletOpened")
//!     .with_tag(Tag::new("wallet", "w1").unwrap());
//! let condition = AppendCondition::idempotent_create(criterion);
//! ```

use crate::cursor::Cursor;
use crate::query::{Query, QueryItem};
use serde::{Deserialize, Serialize};

/// The consistency contract attached to an append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendCondition {
    /// Append regardless of concurrent activity.
    Unconditional,

    /// Append only if the decision still holds.
    Conditional {
        /// The snapshot the caller observed; events at or before this
        /// position cannot conflict.
        after_cursor: Cursor,
        /// Which future events invalidate the decision. The empty query
        /// means none can: the append degenerates to unconditional and the
        /// cursor is ignored.
        state_changed: Query,
        /// Optional whole-log screen for a prior identical operation. A hit
        /// turns the append into a no-op returning the existing events.
        idempotency: Option<QueryItem>,
    },
}

impl AppendCondition {
    /// The unconditional append.
    #[must_use]
    pub const fn unconditional() -> Self {
        Self::Unconditional
    }

    /// Start a conditional append from an observed cursor, with no criterion
    /// yet. Combine with [`AppendCondition::when_changed`] and
    /// [`AppendCondition::with_idempotency`].
    #[must_use]
    pub const fn after(cursor: Cursor) -> Self {
        Self::Conditional {
            after_cursor: cursor,
            state_changed: Query::empty(),
            idempotency: None,
        }
    }

    /// Set the conflict criterion: which events invalidate the decision.
    ///
    /// Called on `Unconditional`, upgrades it to a conditional append from
    /// the zero cursor.
    #[must_use]
    pub fn when_changed(self, query: Query) -> Self {
        match self {
            Self::Unconditional => Self::Conditional {
                after_cursor: Cursor::zero(),
                state_changed: query,
                idempotency: None,
            },
            Self::Conditional {
                after_cursor,
                idempotency,
                ..
            } => Self::Conditional {
                after_cursor,
                state_changed: query,
                idempotency,
            },
        }
    }

    /// Set the idempotency criterion.
    ///
    /// Called on `Unconditional`, upgrades it to a conditional append from
    /// the zero cursor with an empty conflict criterion.
    #[must_use]
    pub fn with_idempotency(self, item: QueryItem) -> Self {
        match self {
            Self::Unconditional => Self::idempotent_create(item),
            Self::Conditional {
                after_cursor,
                state_changed,
                ..
            } => Self::Conditional {
                after_cursor,
                state_changed,
                idempotency: Some(item),
            },
        }
    }

    /// The entity-creation pattern: "append unless an event matching `item`
    /// already exists anywhere in the log; if it does, return it".
    ///
    /// Replaces an external unique index: at most one event satisfying the
    /// criterion can ever be committed.
    #[must_use]
    pub fn idempotent_create(item: QueryItem) -> Self {
        Self::Conditional {
            after_cursor: Cursor::zero(),
            state_changed: Query::empty(),
            idempotency: Some(item),
        }
    }

    /// Whether the engine can skip both checks: unconditional, or
    /// conditional with an empty criterion and no idempotency screen.
    #[must_use]
    pub fn is_effectively_unconditional(&self) -> bool {
        match self {
            Self::Unconditional => true,
            Self::Conditional {
                state_changed,
                idempotency,
                ..
            } => state_changed.is_empty() && idempotency.is_none(),
        }
    }
}

impl Default for AppendCondition {
    fn default() -> Self {
        Self::Unconditional
    }
}
