//! Event store schema and row decoding.
//!
//! One append-only table carries the whole log:
//!
//! - `position` is the primary key and the global order;
//! - `tags` holds the `key=value` wire forms, indexed with GIN so
//!   containment probes (`tags @> ...`) stay cheap as the log grows;
//! - `transaction_id` is the `xid8` of the writing transaction, assigned by
//!   the database itself - scans order by `(transaction_id, position)` and
//!   filter on it for snapshot visibility.

use dcb_core::error::{EventLogError, Result};
use dcb_core::{Position, StoredEvent, Tag, TransactionId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;

/// DDL for the events table and its indexes. Idempotent.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS events (
    position        BIGINT PRIMARY KEY,
    event_type      TEXT NOT NULL CHECK (event_type <> ''),
    tags            TEXT[] NOT NULL DEFAULT '{}',
    data            BYTEA NOT NULL,
    transaction_id  XID8 NOT NULL DEFAULT pg_current_xact_id(),
    occurred_at     TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_tags ON events USING GIN (tags);
CREATE INDEX IF NOT EXISTS idx_events_type ON events (event_type);
CREATE INDEX IF NOT EXISTS idx_events_txid ON events (transaction_id, position);
";

/// The column list every row-returning statement selects, in the order
/// [`decode_row`] expects.
pub(crate) const SELECT_COLUMNS: &str =
    "position, event_type, tags, data, transaction_id::text AS transaction_id, occurred_at";

/// Snapshot visibility predicate: only transactions below every in-flight
/// transaction are visible, plus the current transaction's own writes when
/// reading inside a transactional scope.
pub(crate) const VISIBLE: &str = "(transaction_id < pg_snapshot_xmin(pg_current_snapshot()) \
     OR transaction_id = pg_current_xact_id_if_assigned())";

/// Create the schema if it does not exist.
///
/// # Errors
///
/// Returns [`EventLogError::Storage`] if DDL execution fails.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .map_err(|e| EventLogError::Storage(format!("schema init failed: {e}")))?;
    tracing::info!("Event store schema ready");
    Ok(())
}

/// Decode one `events` row into a [`StoredEvent`].
pub(crate) fn decode_row(row: &PgRow) -> Result<StoredEvent> {
    let position: i64 = row
        .try_get("position")
        .map_err(|e| EventLogError::Storage(format!("bad position column: {e}")))?;
    let event_type: String = row
        .try_get("event_type")
        .map_err(|e| EventLogError::Storage(format!("bad event_type column: {e}")))?;
    let raw_tags: Vec<String> = row
        .try_get("tags")
        .map_err(|e| EventLogError::Storage(format!("bad tags column: {e}")))?;
    let data: Vec<u8> = row
        .try_get("data")
        .map_err(|e| EventLogError::Storage(format!("bad data column: {e}")))?;
    let transaction_id: String = row
        .try_get("transaction_id")
        .map_err(|e| EventLogError::Storage(format!("bad transaction_id column: {e}")))?;
    let occurred_at = row
        .try_get("occurred_at")
        .map_err(|e| EventLogError::Storage(format!("bad occurred_at column: {e}")))?;

    let tags: BTreeSet<Tag> = raw_tags
        .iter()
        .map(|t| {
            t.parse().map_err(|e| {
                EventLogError::Storage(format!("malformed tag '{t}' in store: {e}"))
            })
        })
        .collect::<Result<_>>()?;

    let position = u64::try_from(position)
        .map_err(|_| EventLogError::Storage(format!("negative position {position}")))?;

    Ok(StoredEvent {
        event_type: event_type.into(),
        tags,
        data,
        position: Position::new(position),
        occurred_at,
        transaction_id: TransactionId::new(transaction_id),
    })
}
