//! Criterion queries: the decision models that scope consistency.
//!
//! A [`QueryItem`] is a conjunction over an event: "type is one of these AND
//! all of these tags are present". A [`Query`] is an ordered disjunction of
//! items. Queries drive three things:
//!
//! - which events a projection folds ([`crate::log::EventLog::scan`]),
//! - which future events invalidate a decision (the `state_changed`
//!   criterion of a conditional append),
//! - which prior event satisfies an idempotency criterion.
//!
//! # Empty-query semantics
//!
//! [`Query::empty`] matches **no events**. That is the right default for a
//! conflict criterion (an empty criterion never conflicts). A raw unfiltered
//! scan is expressed with [`Query::all`], which carries an explicit
//! unconstrained item - so the choice is always visible at the call site.
//!
//! # Examples
//!
//! ```
//! use dcb_core::query::{Query, QueryItem};
//! use dcb_core::tag::Tag;
//!
//! let wallet = Tag::new("wallet", "w1").unwrap();
//! let query = Query::any_of([
//!     QueryItem::of_type("DepositMade").with_tag(wallet.clone()),
//!     QueryItem::of_type("WithdrawalMade").with_tag(wallet),
//! ]);
//! assert_eq!(query.items().len(), 2);
//! ```

use crate::event::EventType;
use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A conjunction criterion on a single event.
///
/// An event satisfies the item iff its type is in `event_types` (an empty
/// set means *any type*) and its tag set contains every tag in
/// `required_tags` (an empty set means *no tag constraint*).
///
/// An item with both sets empty is **vacuous**; [`Query`] construction
/// silently drops vacuous items, and a vacuous item in an idempotency
/// criterion is rejected at append time. Use [`QueryItem::matching_any`]
/// where "match everything" is genuinely meant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryItem {
    event_types: BTreeSet<EventType>,
    required_tags: BTreeSet<Tag>,
}

impl QueryItem {
    /// An item constrained to a single event type.
    #[must_use]
    pub fn of_type(event_type: impl Into<EventType>) -> Self {
        Self {
            event_types: BTreeSet::from([event_type.into()]),
            required_tags: BTreeSet::new(),
        }
    }

    /// An item constrained only by tags (any event type).
    #[must_use]
    pub fn tagged(tag: Tag) -> Self {
        Self {
            event_types: BTreeSet::new(),
            required_tags: BTreeSet::from([tag]),
        }
    }

    /// The explicitly vacuous item: matches every event.
    ///
    /// Only meaningful as a raw-scan filter; never as a conflict or
    /// idempotency criterion.
    #[must_use]
    pub fn matching_any() -> Self {
        Self::default()
    }

    /// Add an accepted event type.
    #[must_use]
    pub fn with_type(mut self, event_type: impl Into<EventType>) -> Self {
        self.event_types.insert(event_type.into());
        self
    }

    /// Add a required tag.
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.required_tags.insert(tag);
        self
    }

    /// Add several required tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.required_tags.extend(tags);
        self
    }

    /// Accepted event types; empty means any.
    #[must_use]
    pub fn event_types(&self) -> &BTreeSet<EventType> {
        &self.event_types
    }

    /// Required tags; empty means unconstrained.
    #[must_use]
    pub fn required_tags(&self) -> &BTreeSet<Tag> {
        &self.required_tags
    }

    /// Whether both constraint sets are empty.
    #[must_use]
    pub fn is_vacuous(&self) -> bool {
        self.event_types.is_empty() && self.required_tags.is_empty()
    }
}

/// An ordered disjunction of [`QueryItem`]s.
///
/// An event matches the query iff it satisfies at least one item. The empty
/// query matches no events. Vacuous items are dropped at construction, so a
/// query built only from vacuous items is empty ([`Query::all`] is the one
/// deliberate exception).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    items: Vec<QueryItem>,
}

impl Query {
    /// The query that matches no events.
    ///
    /// As a `state_changed` criterion this means "no event can invalidate
    /// the decision" - the conditional append degenerates to unconditional.
    #[must_use]
    pub const fn empty() -> Self {
        Self { items: Vec::new() }
    }

    /// A single-item query. A vacuous item yields the empty query.
    #[must_use]
    pub fn of(item: QueryItem) -> Self {
        Self::any_of([item])
    }

    /// Build a disjunction from items, dropping vacuous ones.
    #[must_use]
    pub fn any_of(items: impl IntoIterator<Item = QueryItem>) -> Self {
        Self {
            items: items.into_iter().filter(|i| !i.is_vacuous()).collect(),
        }
    }

    /// The query that matches every event: a single
    /// [`QueryItem::matching_any`] item.
    ///
    /// Use this for raw forward scans (outbox-style consumers), never as a
    /// conflict criterion.
    #[must_use]
    pub fn all() -> Self {
        Self {
            items: vec![QueryItem::matching_any()],
        }
    }

    /// The retained items, in order.
    #[must_use]
    pub fn items(&self) -> &[QueryItem] {
        &self.items
    }

    /// Whether the query has no items (matches nothing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn vacuous_items_are_dropped() {
        let query = Query::any_of([QueryItem::default(), QueryItem::of_type("A")]);
        assert_eq!(query.items().len(), 1);

        let all_vacuous = Query::of(QueryItem::default());
        assert!(all_vacuous.is_empty());
    }

    #[test]
    fn all_keeps_its_vacuous_item() {
        assert_eq!(Query::all().items().len(), 1);
        assert!(!Query::all().is_empty());
    }

    #[test]
    fn empty_query_has_no_items() {
        assert!(Query::empty().is_empty());
    }
}
