//! `PgEventLog`: the production event log.
//!
//! # Concurrency model
//!
//! Appends serialize on a transaction-scoped advisory lock
//! (`pg_advisory_xact_lock`), cluster-wide because it lives in the
//! database. The critical section is short: idempotency probe, conflict
//! probe, and O(batch) inserts. Readers never take the lock - scans and
//! projections run against a stable snapshot and do not block appends.
//!
//! Entity-level scoping needs no per-entity locks: the tag-based conflict
//! criterion already confines conflicts to overlapping boundaries, so
//! operations on disjoint tag scopes only contend for the brief
//! serialization window, not for each other's outcomes.
//!
//! # Read routing
//!
//! When a read pool is configured, `scan`, `exists`, and `head` use it;
//! otherwise they fall through to the write pool. Reads inside
//! [`PgEventLog::execute_in_transaction`] always go through the scope's
//! write connection so earlier in-scope appends are visible.

use crate::append::{append_if_on, position_param, storage_error};
use crate::query::{exists_on, head_on, scan_sql};
use crate::schema::{decode_row, init_schema};
use async_stream::stream;
use dcb_core::clock::{Clock, SystemClock};
use dcb_core::error::{EventLogError, Result};
use dcb_core::log::{AppendOutcome, LogFuture};
use dcb_core::{AppendCondition, AppendEvent, Cursor, EventLog, Query, QueryItem, StoredEvent};
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;

/// Advisory lock key the append path serializes on, unless overridden via
/// [`PgEventLogBuilder::append_lock_key`]. Distinct stores sharing one
/// database must use distinct keys.
pub const DEFAULT_APPEND_LOCK_KEY: i64 = 0x0DCB_0001;

/// `PostgreSQL`-backed [`EventLog`].
///
/// Cloning is cheap and shares the underlying pools.
///
/// # Example
///
/// ```ignore
/// use dcb_postgres::PgEventLog;
///
/// let log = PgEventLog::connect("postgres://localhost/events").await?;
/// let stored = log.append(vec![event]).await?;
/// ```
#[derive(Clone)]
pub struct PgEventLog {
    write: PgPool,
    read: Option<PgPool>,
    clock: Arc<dyn Clock>,
    lock_key: i64,
}

impl PgEventLog {
    /// Connect to `database_url`, initialize the schema, and return a log
    /// with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] if the connection or schema
    /// initialization fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| EventLogError::Storage(format!("failed to connect: {e}")))?;
        Self::builder().write_pool(pool).build().await
    }

    /// Start building a log from existing pools.
    #[must_use]
    pub fn builder() -> PgEventLogBuilder {
        PgEventLogBuilder::new()
    }

    /// The pool serving reads outside a transactional scope.
    #[must_use]
    pub fn read_pool(&self) -> &PgPool {
        self.read.as_ref().unwrap_or(&self.write)
    }

    /// The pool serving appends and transactional scopes.
    #[must_use]
    pub const fn write_pool(&self) -> &PgPool {
        &self.write
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub(crate) const fn lock_key(&self) -> i64 {
        self.lock_key
    }
}

impl EventLog for PgEventLog {
    fn scan(
        &self,
        query: Query,
        after: Cursor,
        limit: Option<u64>,
    ) -> BoxStream<'_, Result<StoredEvent>> {
        let pool = self.read_pool().clone();
        let (sql, binds) = scan_sql(&query, limit);
        let after = position_param(after.position);

        Box::pin(stream! {
            let mut statement = sqlx::query(&sql).bind(after);
            for bind in &binds {
                statement = statement.bind(bind.clone());
            }
            let mut rows = statement.fetch(&pool);
            while let Some(row) = rows.next().await {
                match row {
                    Ok(row) => yield decode_row(&row),
                    Err(e) => {
                        yield Err(storage_error(e));
                        break;
                    }
                }
            }
        })
    }

    fn exists(&self, item: QueryItem, after: Cursor) -> LogFuture<'_, bool> {
        Box::pin(async move {
            let mut conn = self
                .read_pool()
                .acquire()
                .await
                .map_err(storage_error)?;
            exists_on(&mut conn, &item, after.position).await
        })
    }

    fn append_if(
        &self,
        events: Vec<AppendEvent>,
        condition: AppendCondition,
    ) -> LogFuture<'_, AppendOutcome> {
        Box::pin(async move {
            let mut tx = self.write.begin().await.map_err(storage_error)?;
            match append_if_on(&mut tx, &*self.clock, self.lock_key, events, condition).await
            {
                Ok(outcome) => {
                    tx.commit().await.map_err(storage_error)?;
                    Ok(outcome)
                }
                Err(error) => {
                    // Rollback also releases the advisory lock; a failed
                    // rollback only loses the connection, not correctness.
                    if let Err(rollback) = tx.rollback().await {
                        tracing::error!(error = %rollback, "Rollback failed after append error");
                    }
                    Err(error)
                }
            }
        })
    }

    fn head(&self) -> LogFuture<'_, Cursor> {
        Box::pin(async move {
            let mut conn = self
                .read_pool()
                .acquire()
                .await
                .map_err(storage_error)?;
            head_on(&mut conn).await
        })
    }
}

/// Builder for [`PgEventLog`]: pools, clock, lock key, schema control.
///
/// # Example
///
/// ```ignore
/// let log = PgEventLog::builder()
///     .write_pool(write)
///     .read_pool(replica)
///     .clock(Arc::new(SystemClock))
///     .build()
///     .await?;
/// ```
pub struct PgEventLogBuilder {
    write: Option<PgPool>,
    read: Option<PgPool>,
    clock: Arc<dyn Clock>,
    lock_key: i64,
    create_schema: bool,
}

impl Default for PgEventLogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PgEventLogBuilder {
    /// A builder with the system clock, the default lock key, and schema
    /// creation enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            write: None,
            read: None,
            clock: Arc::new(SystemClock),
            lock_key: DEFAULT_APPEND_LOCK_KEY,
            create_schema: true,
        }
    }

    /// The pool used for appends and transactional scopes. Required.
    #[must_use]
    pub fn write_pool(mut self, pool: PgPool) -> Self {
        self.write = Some(pool);
        self
    }

    /// Optional read-replica pool for scans outside transactional scopes.
    #[must_use]
    pub fn read_pool(mut self, pool: PgPool) -> Self {
        self.read = Some(pool);
        self
    }

    /// Inject a clock; tests pin time with a fixed clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the advisory lock key serializing appends.
    #[must_use]
    pub const fn append_lock_key(mut self, key: i64) -> Self {
        self.lock_key = key;
        self
    }

    /// Skip schema creation (the schema is managed externally).
    #[must_use]
    pub const fn without_schema_init(mut self) -> Self {
        self.create_schema = false;
        self
    }

    /// Finish the build, creating the schema unless disabled.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::InvalidInput`] when no write pool was
    /// given, or [`EventLogError::Storage`] if schema creation fails.
    pub async fn build(self) -> Result<PgEventLog> {
        let write = self.write.ok_or_else(|| {
            EventLogError::InvalidInput("a write pool is required".to_string())
        })?;
        if self.create_schema {
            init_schema(&write).await?;
        }
        Ok(PgEventLog {
            write,
            read: self.read,
            clock: self.clock,
            lock_key: self.lock_key,
        })
    }
}
