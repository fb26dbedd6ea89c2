//! Rendering criterion queries to SQL predicates.
//!
//! A [`Query`] compiles to a disjunction of per-item conjunctions over the
//! `event_type` column and the `tags` array:
//!
//! ```sql
//! (event_type = ANY($2) AND tags @> $3) OR (tags @> $4)
//! ```
//!
//! All binds are `TEXT[]` values: the type list binds behind `= ANY`, the
//! required tags bind behind the GIN-backed containment operator `@>` in
//! their `key=value` wire form. An empty constraint set renders no clause
//! (empty type set = any type); the empty query renders `FALSE`, matching
//! the in-memory semantics of `dcb_core::matcher`.
//!
//! The SQL string is assembled from numbered placeholders only - no value
//! is ever interpolated into the text.

use dcb_core::{Query, QueryItem};

/// A rendered predicate: SQL text plus its `TEXT[]` binds, in placeholder
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Criteria {
    pub(crate) sql: String,
    pub(crate) binds: Vec<Vec<String>>,
}

/// Render `query` to a predicate whose first placeholder is `$first_param`.
pub(crate) fn render_query(query: &Query, first_param: usize) -> Criteria {
    let mut clauses = Vec::with_capacity(query.items().len());
    let mut binds = Vec::new();
    let mut param = first_param;

    for item in query.items() {
        let (clause, item_binds) = render_item(item, &mut param);
        clauses.push(clause);
        binds.extend(item_binds);
    }

    let sql = if clauses.is_empty() {
        "FALSE".to_string()
    } else {
        clauses.join(" OR ")
    };

    Criteria { sql, binds }
}

fn render_item(item: &QueryItem, param: &mut usize) -> (String, Vec<Vec<String>>) {
    let mut terms = Vec::with_capacity(2);
    let mut binds = Vec::with_capacity(2);

    if !item.event_types().is_empty() {
        terms.push(format!("event_type = ANY(${param})"));
        *param += 1;
        binds.push(
            item.event_types()
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
        );
    }

    if !item.required_tags().is_empty() {
        terms.push(format!("tags @> ${param}"));
        *param += 1;
        binds.push(item.required_tags().iter().map(ToString::to_string).collect());
    }

    // A vacuous item only reaches this point through Query::all().
    if terms.is_empty() {
        return ("TRUE".to_string(), binds);
    }

    let clause = if terms.len() == 1 {
        terms.remove(0)
    } else {
        format!("({})", terms.join(" AND "))
    };
    (clause, binds)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dcb_core::Tag;

    #[test]
    fn empty_query_renders_false() {
        let criteria = render_query(&Query::empty(), 2);
        assert_eq!(criteria.sql, "FALSE");
        assert!(criteria.binds.is_empty());
    }

    #[test]
    fn all_query_renders_true() {
        let criteria = render_query(&Query::all(), 2);
        assert_eq!(criteria.sql, "TRUE");
        assert!(criteria.binds.is_empty());
    }

    #[test]
    fn type_only_item() {
        let criteria = render_query(&Query::of(QueryItem::of_type("A").with_type("B")), 2);
        assert_eq!(criteria.sql, "event_type = ANY($2)");
        assert_eq!(criteria.binds, vec![vec!["A".to_string(), "B".to_string()]]);
    }

    #[test]
    fn tag_only_item() {
        let tag = Tag::new("wallet", "w1").unwrap();
        let criteria = render_query(&Query::of(QueryItem::tagged(tag)), 3);
        assert_eq!(criteria.sql, "tags @> $3");
        assert_eq!(criteria.binds, vec![vec!["wallet=w1".to_string()]]);
    }

    #[test]
    fn conjunction_within_item_disjunction_across() {
        let wallet = Tag::new("wallet", "w1").unwrap();
        let query = Query::any_of([
            QueryItem::of_type("DepositMade").with_tag(wallet.clone()),
            QueryItem::tagged(Tag::new("wallet", "w2").unwrap()),
        ]);
        let criteria = render_query(&query, 2);
        assert_eq!(
            criteria.sql,
            "(event_type = ANY($2) AND tags @> $3) OR tags @> $4"
        );
        assert_eq!(criteria.binds.len(), 3);
        assert_eq!(criteria.binds[1], vec!["wallet=w1".to_string()]);
    }

    #[test]
    fn placeholders_continue_from_first_param() {
        let query = Query::of(QueryItem::of_type("A"));
        let criteria = render_query(&query, 7);
        assert_eq!(criteria.sql, "event_type = ANY($7)");
    }
}
