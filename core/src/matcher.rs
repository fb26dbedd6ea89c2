//! In-memory query evaluation.
//!
//! The storage backends compile a [`Query`] into their own evaluation form
//! (the Postgres backend renders it to a SQL predicate); this module is the
//! reference semantics both must agree with, and the evaluator used by the
//! in-memory backend and projection post-filters.
//!
//! An event matches a query iff some item matches it; an item matches iff
//! the type constraint and every required tag hold. The empty query matches
//! nothing.

use crate::event::{EventType, StoredEvent};
use crate::query::{Query, QueryItem};
use crate::tag::Tag;
use std::collections::BTreeSet;

/// Whether an event with the given type and tags satisfies a single item.
#[must_use]
pub fn item_matches(item: &QueryItem, event_type: &EventType, tags: &BTreeSet<Tag>) -> bool {
    let type_ok = item.event_types().is_empty() || item.event_types().contains(event_type);
    let tags_ok = item.required_tags().is_subset(tags);
    type_ok && tags_ok
}

/// Whether a stored event satisfies a single item.
#[must_use]
pub fn matches_item(event: &StoredEvent, item: &QueryItem) -> bool {
    item_matches(item, &event.event_type, &event.tags)
}

/// Whether a stored event satisfies the query (disjunction across items).
#[must_use]
pub fn matches(event: &StoredEvent, query: &Query) -> bool {
    query.items().iter().any(|item| matches_item(event, item))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event::Position;
    use crate::event::TransactionId;
    use chrono::Utc;
    use proptest::prelude::*;

    fn stored(event_type: &str, tags: &[(&str, &str)]) -> StoredEvent {
        StoredEvent {
            event_type: EventType::new(event_type),
            tags: tags
                .iter()
                .map(|(k, v)| Tag::new(*k, *v).expect("valid test tag"))
                .collect(),
            data: Vec::new(),
            position: Position::new(1),
            occurred_at: Utc::now(),
            transaction_id: TransactionId::new("1"),
        }
    }

    #[test]
    fn type_set_is_disjunctive_within_item() {
        let item = QueryItem::of_type("A").with_type("B");
        assert!(matches_item(&stored("A", &[]), &item));
        assert!(matches_item(&stored("B", &[]), &item));
        assert!(!matches_item(&stored("C", &[]), &item));
    }

    #[test]
    fn required_tags_are_conjunctive() {
        let item = QueryItem::matching_any()
            .with_tag(Tag::new("wallet", "w1").expect("tag"))
            .with_tag(Tag::new("currency", "eur").expect("tag"));

        assert!(matches_item(
            &stored("X", &[("wallet", "w1"), ("currency", "eur"), ("extra", "1")]),
            &item
        ));
        assert!(!matches_item(&stored("X", &[("wallet", "w1")]), &item));
    }

    #[test]
    fn empty_type_set_means_any_type() {
        let item = QueryItem::tagged(Tag::new("wallet", "w1").expect("tag"));
        assert!(matches_item(&stored("Anything", &[("wallet", "w1")]), &item));
    }

    #[test]
    fn empty_query_matches_nothing() {
        assert!(!matches(&stored("A", &[("wallet", "w1")]), &Query::empty()));
    }

    #[test]
    fn query_is_disjunction_across_items() {
        let query = Query::any_of([QueryItem::of_type("A"), QueryItem::of_type("B")]);
        assert!(matches(&stored("A", &[]), &query));
        assert!(matches(&stored("B", &[]), &query));
        assert!(!matches(&stored("C", &[]), &query));
    }

    #[test]
    fn all_query_matches_everything() {
        assert!(matches(&stored("Whatever", &[]), &Query::all()));
    }

    proptest! {
        // Adding items to a query can only widen the match set.
        #[test]
        fn adding_items_is_monotonic(type_name in "[A-Z][a-z]{0,8}", extra in "[A-Z][a-z]{0,8}") {
            let event = stored(&type_name, &[("wallet", "w1")]);
            let narrow = Query::of(QueryItem::of_type(type_name.as_str()));
            let wide = Query::any_of([
                QueryItem::of_type(type_name.as_str()),
                QueryItem::of_type(extra.as_str()),
            ]);
            prop_assert!(!matches(&event, &narrow) || matches(&event, &wide));
        }

        // Requiring more tags can only narrow an item's match set.
        #[test]
        fn adding_required_tags_is_antitone(value in "[a-z0-9]{1,8}") {
            let event = stored("A", &[("wallet", "w1")]);
            let loose = QueryItem::of_type("A");
            let tight = QueryItem::of_type("A").with_tag(Tag::new("other", value.as_str()).expect("tag"));
            prop_assert!(!matches_item(&event, &tight) || matches_item(&event, &loose));
        }
    }
}
