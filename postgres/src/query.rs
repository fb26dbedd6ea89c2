//! Read-path SQL: paged scans, existence probes, and the head cursor.
//!
//! All row-returning statements select [`crate::schema::SELECT_COLUMNS`]
//! and order by `(transaction_id, position)`, which coincides with commit
//! order because positions within one transaction are contiguous.
//!
//! Scans filter through [`crate::schema::VISIBLE`]: an event is yielded
//! only once no transaction older than its writer is still in flight (or
//! when it belongs to the reading transaction itself). This is what makes
//! a scan a consistent snapshot under MVCC - a commit that lands mid-scan
//! is never observed, and positions are never yielded out of order.

use crate::append::{position_param, storage_error};
use crate::criteria::render_query;
use crate::schema::{decode_row, SELECT_COLUMNS, VISIBLE};
use dcb_core::error::Result;
use dcb_core::{Cursor, Position, Query, QueryItem, StoredEvent};
use sqlx::{PgConnection, Row};

/// Render the scan statement for `query`; `$1` binds the cursor position.
pub(crate) fn scan_sql(query: &Query, limit: Option<u64>) -> (String, Vec<Vec<String>>) {
    let criteria = render_query(query, 2);
    let mut sql = format!(
        "SELECT {SELECT_COLUMNS} FROM events \
         WHERE position > $1 AND {VISIBLE} AND ({}) \
         ORDER BY transaction_id, position",
        criteria.sql
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    (sql, criteria.binds)
}

/// One bounded page of a scan, on an arbitrary connection.
pub(crate) async fn scan_page_on(
    conn: &mut PgConnection,
    query: &Query,
    after: Position,
    limit: Option<u64>,
) -> Result<Vec<StoredEvent>> {
    let (sql, binds) = scan_sql(query, limit);
    let mut statement = sqlx::query(&sql).bind(position_param(after));
    for bind in binds {
        statement = statement.bind(bind);
    }
    let rows = statement.fetch_all(conn).await.map_err(storage_error)?;
    rows.iter().map(decode_row).collect()
}

/// Whether any visible event matches `item` strictly after `after`.
pub(crate) async fn exists_on(
    conn: &mut PgConnection,
    item: &QueryItem,
    after: Position,
) -> Result<bool> {
    let criteria = render_query(&Query::of(item.clone()), 2);
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM events WHERE position > $1 AND {VISIBLE} AND ({}))",
        criteria.sql
    );
    let mut statement = sqlx::query_scalar(&sql).bind(position_param(after));
    for bind in criteria.binds {
        statement = statement.bind(bind);
    }
    statement.fetch_one(conn).await.map_err(storage_error)
}

/// Every committed event matching `query`, ignoring visibility horizons -
/// the idempotency screen must see the whole log.
pub(crate) async fn fetch_matching(
    conn: &mut PgConnection,
    query: &Query,
) -> Result<Vec<StoredEvent>> {
    let criteria = render_query(query, 1);
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM events WHERE {} ORDER BY transaction_id, position",
        criteria.sql
    );
    let mut statement = sqlx::query(&sql);
    for bind in criteria.binds {
        statement = statement.bind(bind);
    }
    let rows = statement.fetch_all(conn).await.map_err(storage_error)?;
    rows.iter().map(decode_row).collect()
}

/// The cursor of the latest visible event, or zero for an empty log.
pub(crate) async fn head_on(conn: &mut PgConnection) -> Result<Cursor> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM events WHERE {VISIBLE} \
         ORDER BY position DESC LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .fetch_optional(conn)
        .await
        .map_err(storage_error)?;
    match row {
        Some(row) => Ok(Cursor::from_event(&decode_row(&row)?)),
        None => Ok(Cursor::zero()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcb_core::QueryItem;

    #[test]
    fn scan_sql_orders_by_commit_order() {
        let (sql, _) = scan_sql(&Query::all(), None);
        assert!(sql.contains("ORDER BY transaction_id, position"));
        assert!(sql.contains("position > $1"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn scan_sql_appends_limit() {
        let (sql, _) = scan_sql(&Query::of(QueryItem::of_type("A")), Some(100));
        assert!(sql.ends_with("LIMIT 100"));
    }

    #[test]
    fn empty_query_scans_nothing() {
        let (sql, binds) = scan_sql(&Query::empty(), None);
        assert!(sql.contains("(FALSE)"));
        assert!(binds.is_empty());
    }
}
