//! In-memory event log with full DCB semantics.
//!
//! Mirrors the `PostgreSQL` backend's behavior closely enough that tests
//! written against one backend hold against the other:
//!
//! - the append path runs under a single lock (the in-memory analogue of
//!   the append serialization lock), so positions are gap-free and
//!   monotonic;
//! - scans snapshot the matching events at call time, so an in-flight scan
//!   never observes a later commit (MVCC-like visibility);
//! - the idempotency screen and conflict check follow the same algorithm
//!   and produce the same typed outcomes.
//!
//! A private inverted tag index backs criterion probes, standing in for the
//! GIN index of the production schema.

use dcb_core::clock::{Clock, SystemClock};
use dcb_core::error::{EventLogError, Result};
use dcb_core::log::{validate_append, AppendOutcome, LogFuture};
use dcb_core::{
    AppendCondition, AppendEvent, Cursor, Position, Query, QueryItem, StoredEvent, TransactionId,
};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// In-memory [`dcb_core::EventLog`] for tests.
///
/// Cloning shares the underlying log; clones observe each other's commits.
#[derive(Clone)]
pub struct InMemoryEventLog {
    inner: Arc<Mutex<LogInner>>,
    clock: Arc<dyn Clock>,
}

struct LogInner {
    events: Vec<StoredEvent>,
    // Inverted index: tag -> positions of events carrying it.
    tag_index: HashMap<dcb_core::Tag, BTreeSet<u64>>,
    next_transaction: u64,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventLog {
    /// Create an empty log with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty log with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                events: Vec::new(),
                tag_index: HashMap::new(),
                next_transaction: 1,
            })),
            clock,
        }
    }

    /// Number of committed events.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (a prior test panicked
    /// mid-append).
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("log lock poisoned").events.len()
    }

    /// Whether the log holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LogInner>> {
        self.inner
            .lock()
            .map_err(|_| EventLogError::Storage("log lock poisoned".to_string()))
    }
}

impl LogInner {
    /// Positions of committed events matching the item, ascending,
    /// strictly after `after`. Uses the inverted index when the item has
    /// required tags.
    fn matching_positions(&self, item: &QueryItem, after: Position) -> Vec<u64> {
        let candidates: Vec<&StoredEvent> = if item.required_tags().is_empty() {
            self.events.iter().collect()
        } else {
            // Intersect posting lists, smallest first.
            let mut lists: Vec<&BTreeSet<u64>> = Vec::with_capacity(item.required_tags().len());
            for tag in item.required_tags() {
                match self.tag_index.get(tag) {
                    Some(list) => lists.push(list),
                    None => return Vec::new(),
                }
            }
            lists.sort_by_key(|l| l.len());
            let (first, rest) = match lists.split_first() {
                Some(split) => split,
                None => return Vec::new(),
            };
            first
                .iter()
                .copied()
                .filter(|p| rest.iter().all(|l| l.contains(p)))
                .filter_map(|p| self.events.get(usize::try_from(p - 1).ok()?))
                .collect()
        };

        candidates
            .into_iter()
            .filter(|e| e.position.get() > after.get())
            .filter(|e| {
                item.event_types().is_empty() || item.event_types().contains(&e.event_type)
            })
            .map(|e| e.position.get())
            .collect()
    }

    fn matching_events(&self, query: &Query, after: Position) -> Vec<StoredEvent> {
        let mut positions: BTreeSet<u64> = BTreeSet::new();
        for item in query.items() {
            positions.extend(self.matching_positions(item, after));
        }
        positions
            .into_iter()
            .filter_map(|p| self.events.get(usize::try_from(p - 1).ok()?))
            .cloned()
            .collect()
    }
}

impl dcb_core::EventLog for InMemoryEventLog {
    fn scan(
        &self,
        query: Query,
        after: Cursor,
        limit: Option<u64>,
    ) -> BoxStream<'_, Result<StoredEvent>> {
        // Snapshot at scan start: later commits are invisible to this scan.
        let snapshot = match self.lock() {
            Ok(inner) => inner.matching_events(&query, after.position),
            Err(e) => return stream::iter(vec![Err(e)]).boxed(),
        };
        let take = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        stream::iter(snapshot.into_iter().map(Ok)).take(take).boxed()
    }

    fn exists(&self, item: QueryItem, after: Cursor) -> LogFuture<'_, bool> {
        Box::pin(async move {
            let inner = self.lock()?;
            Ok(!inner.matching_positions(&item, after.position).is_empty())
        })
    }

    fn append_if(
        &self,
        events: Vec<AppendEvent>,
        condition: AppendCondition,
    ) -> LogFuture<'_, AppendOutcome> {
        Box::pin(async move {
            validate_append(&events, &condition)?;

            // The lock is the append serialization boundary: idempotency
            // screen, conflict check, allocation, and insert are atomic.
            let mut inner = self.lock()?;

            if let AppendCondition::Conditional {
                after_cursor,
                state_changed,
                idempotency,
            } = &condition
            {
                if let Some(item) = idempotency {
                    let existing =
                        inner.matching_events(&Query::of(item.clone()), Position::ZERO);
                    if !existing.is_empty() {
                        return Ok(AppendOutcome::IdempotentReplay(existing));
                    }
                }

                if !state_changed.is_empty() {
                    let mut conflicting: BTreeSet<u64> = BTreeSet::new();
                    for item in state_changed.items() {
                        conflicting
                            .extend(inner.matching_positions(item, after_cursor.position));
                    }
                    if !conflicting.is_empty() {
                        return Err(EventLogError::ConcurrencyConflict {
                            matching_count: conflicting.len() as u64,
                            first_conflicting_position: conflicting
                                .first()
                                .copied()
                                .map(Position::new),
                        });
                    }
                }
            }

            let transaction_id = TransactionId::new(inner.next_transaction.to_string());
            inner.next_transaction += 1;

            // occurred_at must be non-decreasing with position even if the
            // injected clock jumps backwards.
            let floor = inner
                .events
                .last()
                .map(|e| e.occurred_at)
                .unwrap_or(chrono::DateTime::UNIX_EPOCH);
            let occurred_at = self.clock.now().max(floor);

            let mut stored = Vec::with_capacity(events.len());
            for event in events {
                let position = Position::new(inner.events.len() as u64 + 1);
                let record = StoredEvent {
                    event_type: event.event_type().clone(),
                    tags: event.tags().clone(),
                    data: event.data().to_vec(),
                    position,
                    occurred_at,
                    transaction_id: transaction_id.clone(),
                };
                for tag in record.tags.iter().cloned() {
                    inner
                        .tag_index
                        .entry(tag)
                        .or_default()
                        .insert(position.get());
                }
                inner.events.push(record.clone());
                stored.push(record);
            }

            Ok(AppendOutcome::Appended(stored))
        })
    }

    fn head(&self) -> LogFuture<'_, Cursor> {
        Box::pin(async move {
            let inner = self.lock()?;
            Ok(inner
                .events
                .last()
                .map_or_else(Cursor::zero, Cursor::from_event))
        })
    }
}
