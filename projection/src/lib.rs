//! # DCB Projection
//!
//! The streaming projection engine: replays events matching a criterion
//! query from a starting cursor, folds them through a
//! [`dcb_core::StateProjector`], and returns the final state together with
//! the cursor of the last folded event - the exact pair a caller needs to
//! build a conditional append.
//!
//! # Design Philosophy
//!
//! The engine is a **transport layer**: it pages through the log in bounded
//! batches and routes events; projectors own the business logic and their
//! payload codecs. The engine never inspects payload bytes.
//!
//! ```text
//! ┌───────────┐  scan(query, cursor)   ┌──────────────────┐
//! │ EventLog  │ ─────────────────────▶ │ ProjectionEngine │
//! └───────────┘   StoredEvent pages    └────────┬─────────┘
//!                                               │ transition(state, event)
//!                                               ▼
//!                                      ┌──────────────────┐
//!                                      │  StateProjector  │
//!                                      └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use dcb_core::{Cursor, EventLog, Query, QueryItem};
//! use dcb_core::projector::FnProjector;
//! use dcb_projection::ProjectionEngine;
//! use dcb_testing::{fixtures::event, InMemoryEventLog};
//!
//! # tokio_test::block_on(async {
//! let log = InMemoryEventLog::new();
//! log.append(vec![event("DepositMade", &[("wallet", "w1")])])
//!     .await
//!     .unwrap();
//!
//! let engine = ProjectionEngine::new(log);
//! let balance = FnProjector::new("deposit-count", 0u64, |n, _e| Ok(n + 1))
//!     .with_event_types(["DepositMade"]);
//!
//! let result = engine
//!     .project(Query::of(QueryItem::of_type("DepositMade")), Cursor::zero(), &balance)
//!     .await
//!     .unwrap();
//! assert_eq!(result.state, 1);
//! assert_eq!(result.cursor.position.get(), 1);
//! # });
//! ```

mod engine;
mod result;

pub use engine::ProjectionEngine;
pub use result::ProjectionResult;
