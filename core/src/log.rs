//! The `EventLog` abstraction: ordered, append-only event storage with
//! criterion-scoped conditional appends.
//!
//! # Design
//!
//! The trait is deliberately minimal. It provides exactly what dynamic
//! consistency boundaries need:
//!
//! - `scan`: forward replay of matching events after a cursor
//! - `exists`: cheap existence probe for conflict checks
//! - `append_if`: atomic conditional append (the DCB contract)
//! - `head`: the latest committed cursor, for pollers
//!
//! It does NOT provide subscriptions, push delivery, or payload parsing.
//! Consumers poll by position; payloads are opaque bytes.
//!
//! # Implementations
//!
//! - `PgEventLog` (in `dcb-postgres`): production implementation
//! - `InMemoryEventLog` (in `dcb-testing`): fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! Methods return explicit `Pin<Box<dyn Future>>` (and `BoxStream` for
//! `scan`) instead of `async fn` so the trait can be used as a trait object
//! (`Arc<dyn EventLog>`) and shared across application layers.

use crate::condition::AppendCondition;
use crate::cursor::Cursor;
use crate::error::{EventLogError, Result};
use crate::event::{AppendEvent, StoredEvent};
use crate::query::{Query, QueryItem};
use futures::stream::BoxStream;
use std::future::Future;
use std::pin::Pin;

/// Boxed future alias used by the dyn-compatible trait methods.
pub type LogFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The outcome of a successful conditional append.
///
/// Idempotent replay is a *success*, not an error: the operation identified
/// by the idempotency criterion has already run, and the caller receives
/// the previously stored events so it can read their assigned positions and
/// timestamps. The observable difference from [`AppendOutcome::Appended`]
/// is that no new events appeared in the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New events were committed, in input order.
    Appended(Vec<StoredEvent>),

    /// The idempotency criterion matched; nothing was appended and no
    /// positions were consumed. Carries the pre-existing matching events.
    IdempotentReplay(Vec<StoredEvent>),
}

impl AppendOutcome {
    /// The stored events, whether fresh or pre-existing.
    #[must_use]
    pub fn events(&self) -> &[StoredEvent] {
        match self {
            Self::Appended(events) | Self::IdempotentReplay(events) => events,
        }
    }

    /// Consume the outcome, yielding the stored events.
    #[must_use]
    pub fn into_events(self) -> Vec<StoredEvent> {
        match self {
            Self::Appended(events) | Self::IdempotentReplay(events) => events,
        }
    }

    /// Whether this was an idempotent no-op.
    #[must_use]
    pub const fn is_replay(&self) -> bool {
        matches!(self, Self::IdempotentReplay(_))
    }
}

/// Ordered persistent event storage with conditional append.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; many callers concurrently scan,
/// project, and append through a shared handle.
///
/// # Ordering and visibility
///
/// Scans yield events in commit order - ascending `(transaction_id,
/// position)` - and read from a consistent snapshot taken at scan start:
/// events committed after the scan began are not yielded, and events of
/// uncommitted transactions never are.
pub trait EventLog: Send + Sync {
    /// Stream events matching `query` with `position > after.position`, in
    /// ascending commit order.
    ///
    /// `limit` bounds the number of events yielded by this call; `None`
    /// streams to the end of the snapshot. The scan is restartable: pass
    /// the cursor of the last seen event to continue. Dropping the stream
    /// cancels the scan.
    fn scan(
        &self,
        query: Query,
        after: Cursor,
        limit: Option<u64>,
    ) -> BoxStream<'_, Result<StoredEvent>>;

    /// Whether any event matching `item` exists with
    /// `position > after.position`.
    ///
    /// Equivalent to scanning `Query::of(item)` with limit 1 and checking
    /// non-emptiness, but cheap enough to sit on the append hot path.
    fn exists(&self, item: QueryItem, after: Cursor) -> LogFuture<'_, bool>;

    /// Atomic conditional append; the core DCB operation.
    ///
    /// Under the append serialization lock, in one transactional unit:
    /// screen the idempotency criterion across the whole log, check the
    /// conflict criterion past the caller's cursor, then allocate positions
    /// and insert. On any failure no positions are consumed and nothing is
    /// indexed.
    ///
    /// # Errors
    ///
    /// - [`EventLogError::InvalidInput`]: empty batch, empty type name, or
    ///   vacuous idempotency criterion; raised before any I/O.
    /// - [`EventLogError::ConcurrencyConflict`]: the conflict criterion
    ///   matched past the cursor.
    /// - [`EventLogError::Storage`]: the backing store failed.
    fn append_if(
        &self,
        events: Vec<AppendEvent>,
        condition: AppendCondition,
    ) -> LogFuture<'_, AppendOutcome>;

    /// Unconditional append convenience; maximal commit throughput.
    ///
    /// # Errors
    ///
    /// As [`EventLog::append_if`], minus the conflict outcome.
    fn append(&self, events: Vec<AppendEvent>) -> LogFuture<'_, Vec<StoredEvent>> {
        Box::pin(async move {
            Ok(self
                .append_if(events, AppendCondition::Unconditional)
                .await?
                .into_events())
        })
    }

    /// The cursor of the latest committed event, or the zero cursor when
    /// the log is empty. The polling hook for outbox-style consumers.
    fn head(&self) -> LogFuture<'_, Cursor>;
}

/// Validate an append batch before any I/O.
///
/// Shared by the storage backends so both reject exactly the same inputs.
///
/// # Errors
///
/// Returns [`EventLogError::InvalidInput`] for an empty batch, an event
/// with an empty type name, or a vacuous idempotency criterion.
pub fn validate_append(
    events: &[AppendEvent],
    condition: &AppendCondition,
) -> Result<()> {
    if events.is_empty() {
        return Err(EventLogError::InvalidInput(
            "append batch must not be empty".to_string(),
        ));
    }
    for event in events {
        if event.event_type().is_empty() {
            return Err(EventLogError::InvalidInput(
                "event type name must not be empty".to_string(),
            ));
        }
    }
    if let AppendCondition::Conditional {
        idempotency: Some(item),
        ..
    } = condition
    {
        if item.is_vacuous() {
            return Err(EventLogError::InvalidInput(
                "idempotency criterion must constrain type or tags".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryItem;

    #[test]
    fn empty_batch_is_invalid() {
        let result = validate_append(&[], &AppendCondition::Unconditional);
        assert!(matches!(result, Err(EventLogError::InvalidInput(_))));
    }

    #[test]
    fn empty_type_name_is_invalid() {
        let events = vec![AppendEvent::new("")];
        let result = validate_append(&events, &AppendCondition::Unconditional);
        assert!(matches!(result, Err(EventLogError::InvalidInput(_))));
    }

    #[test]
    fn vacuous_idempotency_criterion_is_invalid() {
        let events = vec![AppendEvent::new("WalletOpened")];
        let condition = AppendCondition::idempotent_create(QueryItem::matching_any());
        let result = validate_append(&events, &condition);
        assert!(matches!(result, Err(EventLogError::InvalidInput(_))));
    }

    #[test]
    fn plain_batch_passes() {
        let events = vec![AppendEvent::new("DepositMade")];
        assert!(validate_append(&events, &AppendCondition::Unconditional).is_ok());
    }

    #[test]
    fn outcome_accessors() {
        let outcome = AppendOutcome::Appended(Vec::new());
        assert!(!outcome.is_replay());
        assert!(outcome.events().is_empty());

        let replay = AppendOutcome::IdempotentReplay(Vec::new());
        assert!(replay.is_replay());
    }
}
