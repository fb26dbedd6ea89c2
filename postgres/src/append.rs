//! The conditional append critical section.
//!
//! Everything here runs on a single connection inside an open transaction,
//! after `pg_advisory_xact_lock` has serialized the append path. The lock
//! is transaction-scoped: Postgres releases it at commit or rollback, so
//! every exit path - including the conflict error - gives it up.
//!
//! Position allocation is `MAX(position) + 1` computed under the lock and
//! inside the same transaction as the inserts. A rollback therefore cannot
//! burn a position: the gap-free invariant holds without a detached
//! sequence.

use crate::criteria::render_query;
use crate::query::fetch_matching;
use dcb_core::clock::Clock;
use dcb_core::error::{EventLogError, Result};
use dcb_core::log::{validate_append, AppendOutcome};
use dcb_core::{AppendCondition, AppendEvent, Position, Query, StoredEvent, TransactionId};
use metrics::{counter, histogram};
use sqlx::{PgConnection, Row};
use std::time::Instant;

pub(crate) fn storage_error(e: sqlx::Error) -> EventLogError {
    EventLogError::Storage(e.to_string())
}

/// Run the full conditional-append algorithm on an open transaction.
///
/// Steps: advisory lock, idempotency screen, conflict check, allocation,
/// insert. The caller owns commit/rollback.
pub(crate) async fn append_if_on(
    conn: &mut PgConnection,
    clock: &dyn Clock,
    lock_key: i64,
    events: Vec<AppendEvent>,
    condition: AppendCondition,
) -> Result<AppendOutcome> {
    validate_append(&events, &condition)?;

    let critical_section = Instant::now();
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(lock_key)
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;

    if let AppendCondition::Conditional {
        after_cursor,
        state_changed,
        idempotency,
    } = &condition
    {
        if let Some(item) = idempotency {
            let existing =
                fetch_matching(&mut *conn, &Query::of(item.clone())).await?;
            if !existing.is_empty() {
                counter!("dcb_idempotent_replays_total").increment(1);
                tracing::warn!(
                    matching = existing.len(),
                    first_position = existing[0].position.get(),
                    "Idempotency criterion already satisfied; append is a no-op"
                );
                return Ok(AppendOutcome::IdempotentReplay(existing));
            }
        }

        if !state_changed.is_empty() {
            if let Some((matching_count, first_conflicting_position)) =
                conflict_probe(&mut *conn, state_changed, after_cursor.position).await?
            {
                counter!("dcb_append_conflicts_total").increment(1);
                tracing::warn!(
                    matching_count,
                    after_position = after_cursor.position.get(),
                    "Conditional append conflicted"
                );
                return Err(EventLogError::ConcurrencyConflict {
                    matching_count,
                    first_conflicting_position,
                });
            }
        }
    }

    let stored = insert_events(&mut *conn, clock, events).await?;

    histogram!("dcb_append_critical_section_seconds")
        .record(critical_section.elapsed().as_secs_f64());
    counter!("dcb_events_appended_total").increment(stored.len() as u64);
    for event in &stored {
        counter!(
            "dcb_events_appended_by_type_total",
            "event_type" => event.event_type.as_str().to_string()
        )
        .increment(1);
    }
    tracing::debug!(
        count = stored.len(),
        first_position = stored[0].position.get(),
        "Events appended"
    );

    Ok(AppendOutcome::Appended(stored))
}

/// Count committed events matching the criterion strictly after `after`.
/// Returns `None` when the decision still holds.
async fn conflict_probe(
    conn: &mut PgConnection,
    state_changed: &Query,
    after: Position,
) -> Result<Option<(u64, Option<Position>)>> {
    // No snapshot filter here: the check must see every committed event,
    // and the advisory lock guarantees no append is in flight.
    let criteria = render_query(state_changed, 2);
    let sql = format!(
        "SELECT COUNT(*) AS matching, MIN(position) AS first_position \
         FROM events WHERE position > $1 AND ({})",
        criteria.sql
    );

    let mut probe = sqlx::query(&sql).bind(position_param(after));
    for bind in criteria.binds {
        probe = probe.bind(bind);
    }
    let row = probe.fetch_one(conn).await.map_err(storage_error)?;

    let matching: i64 = row.try_get("matching").map_err(storage_error)?;
    if matching == 0 {
        return Ok(None);
    }
    let first: Option<i64> = row.try_get("first_position").map_err(storage_error)?;
    Ok(Some((
        matching.unsigned_abs(),
        first.and_then(|p| u64::try_from(p).ok()).map(Position::new),
    )))
}

/// Allocate positions past the current head and insert the batch. The
/// database assigns `transaction_id`; all rows of the batch share it.
async fn insert_events(
    conn: &mut PgConnection,
    clock: &dyn Clock,
    events: Vec<AppendEvent>,
) -> Result<Vec<StoredEvent>> {
    let head = sqlx::query(
        "SELECT COALESCE(MAX(position), 0) AS head_position, \
                COALESCE(MAX(occurred_at), 'epoch'::timestamptz) AS head_occurred_at \
         FROM events",
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(storage_error)?;

    let base: i64 = head.try_get("head_position").map_err(storage_error)?;
    let floor: chrono::DateTime<chrono::Utc> =
        head.try_get("head_occurred_at").map_err(storage_error)?;

    // occurred_at must be non-decreasing with position even across clock
    // regressions.
    let occurred_at = clock.now().max(floor);

    let mut stored = Vec::with_capacity(events.len());
    let mut shared_transaction: Option<TransactionId> = None;

    for (offset, event) in events.into_iter().enumerate() {
        let position = base + 1 + i64::try_from(offset).unwrap_or(i64::MAX);
        let tags: Vec<String> = event.tags().iter().map(ToString::to_string).collect();

        let transaction_id: String = sqlx::query_scalar(
            "INSERT INTO events (position, event_type, tags, data, occurred_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING transaction_id::text",
        )
        .bind(position)
        .bind(event.event_type().as_str())
        .bind(&tags)
        .bind(event.data())
        .bind(occurred_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(storage_error)?;

        let transaction_id = shared_transaction
            .get_or_insert(TransactionId::new(transaction_id))
            .clone();

        stored.push(StoredEvent {
            event_type: event.event_type().clone(),
            tags: event.tags().clone(),
            data: event.data().to_vec(),
            position: Position::new(position.unsigned_abs()),
            occurred_at,
            transaction_id,
        });
    }

    Ok(stored)
}

/// A `Position` as the `BIGINT` bind Postgres expects.
pub(crate) fn position_param(position: Position) -> i64 {
    i64::try_from(position.get()).unwrap_or(i64::MAX)
}
