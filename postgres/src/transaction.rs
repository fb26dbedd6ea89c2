//! Transactional scopes: several core operations in one ACID unit.
//!
//! [`PgEventLog::execute_in_transaction`] begins a transaction on the
//! write pool, hands the closure a [`PgLogTransaction`] bound to it, and
//! commits on `Ok` / rolls back on `Err`, re-raising the closure's error.
//! The handle routes every operation - reads included - through the
//! scope's connection, so an append made earlier in the scope is visible
//! to a later scan or projection in the same scope.
//!
//! The handle is deliberately not `Send`-shareable: it owns the scope's
//! single connection and is used from one task.
//!
//! # Example
//!
//! ```ignore
//! let stored = log
//!     .execute_in_transaction(|tx| {
//!         Box::pin(async move {
//!             let result = tx.project(&query, Cursor::zero(), &projector).await?;
//!             if result.state.balance < amount {
//!                 return Err(AppError::InsufficientFunds);
//!             }
//!             let outcome = tx
//!                 .append_if(events, AppendCondition::after(result.cursor))
//!                 .await?;
//!             Ok(outcome.into_events())
//!         })
//!     })
//!     .await?;
//! ```

use crate::append::append_if_on;
use crate::append::storage_error;
use crate::log::PgEventLog;
use crate::query::{exists_on, head_on, scan_page_on};
use dcb_core::clock::Clock;
use dcb_core::error::{EventLogError, ProjectionError, Result};
use dcb_core::log::AppendOutcome;
use dcb_core::{
    AppendCondition, AppendEvent, Cursor, Query, QueryItem, StateProjector, StoredEvent,
};
use dcb_projection::ProjectionResult;
use futures::future::BoxFuture;
use sqlx::{Postgres, Transaction};
use std::sync::Arc;

/// Scan page size used by [`PgLogTransaction::project`].
const PROJECT_BATCH_SIZE: u64 = 1_000;

/// A handle to the core operations, bound to one open transaction.
pub struct PgLogTransaction {
    tx: Transaction<'static, Postgres>,
    clock: Arc<dyn Clock>,
    lock_key: i64,
}

impl PgLogTransaction {
    /// Conditional append inside the scope. The advisory lock taken here
    /// is transaction-scoped and is held until the scope commits or rolls
    /// back - keep scopes that append short.
    ///
    /// # Errors
    ///
    /// As [`dcb_core::EventLog::append_if`].
    pub async fn append_if(
        &mut self,
        events: Vec<AppendEvent>,
        condition: AppendCondition,
    ) -> Result<AppendOutcome> {
        append_if_on(&mut self.tx, &*self.clock, self.lock_key, events, condition).await
    }

    /// One bounded page of matching events, through the scope's
    /// connection; in-scope appends are visible.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] if the query fails.
    pub async fn scan_page(
        &mut self,
        query: &Query,
        after: Cursor,
        limit: Option<u64>,
    ) -> Result<Vec<StoredEvent>> {
        scan_page_on(&mut self.tx, query, after.position, limit).await
    }

    /// Existence probe through the scope's connection.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] if the query fails.
    pub async fn exists(&mut self, item: &QueryItem, after: Cursor) -> Result<bool> {
        exists_on(&mut self.tx, item, after.position).await
    }

    /// The latest cursor as seen by this scope.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] if the query fails.
    pub async fn head(&mut self) -> Result<Cursor> {
        head_on(&mut self.tx).await
    }

    /// Project matching events into state, paging through the scope's
    /// connection. Same fold semantics as
    /// `dcb_projection::ProjectionEngine::project`.
    ///
    /// # Errors
    ///
    /// As `ProjectionEngine::project`, minus cancellation.
    pub async fn project<P: StateProjector>(
        &mut self,
        query: &Query,
        from: Cursor,
        projector: &P,
    ) -> std::result::Result<ProjectionResult<P::State>, ProjectionError> {
        let mut cursor = from;
        let mut state = projector.initial_state();

        loop {
            let page = self
                .scan_page(query, cursor.clone(), Some(PROJECT_BATCH_SIZE))
                .await?;
            let page_len = page.len() as u64;

            for event in &page {
                if projector.wants(&event.event_type) {
                    state = projector.transition(state, event).map_err(|source| {
                        ProjectionError::Projector {
                            id: projector.id().to_string(),
                            source,
                        }
                    })?;
                }
                cursor = Cursor::from_event(event);
            }

            if page_len < PROJECT_BATCH_SIZE {
                break;
            }
        }

        Ok(ProjectionResult::new(state, cursor))
    }
}

impl PgEventLog {
    /// Run `f` inside one write transaction: commit on `Ok`, roll back on
    /// `Err`, re-raising the closure's error. The error type only needs a
    /// `From<EventLogError>` conversion, so application-level errors
    /// (which also roll the scope back) pass through unchanged.
    ///
    /// # Errors
    ///
    /// The closure's error after rollback, or the storage failure from
    /// beginning or committing the transaction.
    pub async fn execute_in_transaction<R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        R: Send,
        E: From<EventLogError> + Send,
        F: for<'t> FnOnce(&'t mut PgLogTransaction) -> BoxFuture<'t, std::result::Result<R, E>>
            + Send,
    {
        let tx = self
            .write_pool()
            .begin()
            .await
            .map_err(|e| E::from(storage_error(e)))?;
        let mut scope = PgLogTransaction {
            tx,
            clock: self.clock(),
            lock_key: self.lock_key(),
        };

        match f(&mut scope).await {
            Ok(value) => {
                scope
                    .tx
                    .commit()
                    .await
                    .map_err(|e| E::from(storage_error(e)))?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = scope.tx.rollback().await {
                    tracing::error!(error = %rollback, "Rollback failed in transactional scope");
                }
                Err(error)
            }
        }
    }
}
