//! # DCB Core
//!
//! Core types and traits for an append-only event store with **dynamic
//! consistency boundaries** (DCB): instead of fixed aggregate streams, each
//! operation declares - as a criterion query - which events its decision
//! depends on, and the store rejects the append if any matching event was
//! committed after the cursor the caller observed.
//!
//! ## The shape of an operation
//!
//! 1. Build a [`query::Query`] describing the relevant events (the
//!    *decision model*).
//! 2. Project matching events into state with a
//!    [`projector::StateProjector`] (see `dcb-projection`), receiving
//!    `(state, cursor)`.
//! 3. Decide, then call [`log::EventLog::append_if`] with the new events
//!    and an [`condition::AppendCondition`] combining the query and cursor.
//! 4. On [`error::EventLogError::ConcurrencyConflict`], re-project and
//!    retry.
//!
//! ## Crates
//!
//! - `dcb-core` (this crate): value types, traits, in-memory matching
//! - `dcb-projection`: the streaming projection engine
//! - `dcb-postgres`: the production `PostgreSQL` backend
//! - `dcb-testing`: in-memory backend and deterministic clock

pub mod clock;
pub mod condition;
pub mod cursor;
pub mod error;
pub mod event;
pub mod log;
pub mod matcher;
pub mod projector;
pub mod query;
pub mod tag;

pub use clock::{Clock, SystemClock};
pub use condition::AppendCondition;
pub use cursor::Cursor;
pub use error::{EventLogError, ProjectionError, TransitionError};
pub use event::{AppendEvent, EventType, Position, StoredEvent, TransactionId};
pub use log::{AppendOutcome, EventLog};
pub use projector::StateProjector;
pub use query::{Query, QueryItem};
pub use tag::Tag;
