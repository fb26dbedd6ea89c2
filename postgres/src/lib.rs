//! # DCB Postgres
//!
//! The production `PostgreSQL` backend of the DCB event store. Implements
//! [`dcb_core::EventLog`] with:
//!
//! - a single append-only `events` table keyed by global position, with a
//!   GIN index over the tag array for containment queries;
//! - append serialization through a transaction-scoped advisory lock, so
//!   positions are gap-free and conflict checks are race-free;
//! - MVCC snapshot visibility for scans (`xid8`-horizon filter), so a
//!   long-running scan never observes a commit that landed after it
//!   started;
//! - read/write pool routing and an explicit
//!   [`PgEventLog::execute_in_transaction`] combinator for multi-operation
//!   ACID scopes.
//!
//! Behavior is specified by the `dcb-core` contract and mirrored by the
//! in-memory backend in `dcb-testing`; the integration tests drive both
//! through the same scenarios.

mod append;
mod criteria;
mod log;
mod query;
mod schema;
mod transaction;

pub use log::{PgEventLog, PgEventLogBuilder, DEFAULT_APPEND_LOCK_KEY};
pub use schema::{init_schema, SCHEMA_SQL};
pub use transaction::PgLogTransaction;
