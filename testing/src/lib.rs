//! # DCB Testing
//!
//! Testing utilities for the DCB store:
//!
//! - [`InMemoryEventLog`]: a complete in-memory [`EventLog`] with the same
//!   conflict and idempotency semantics as the `PostgreSQL` backend -
//!   fast, deterministic, no external services
//! - [`FixedClock`]: deterministic time
//! - [`fixtures`]: event construction helpers
//!
//! ## Example
//!
//! ```
//! use dcb_core::{AppendEvent, EventLog};
//! use dcb_testing::InMemoryEventLog;
//!
//! # tokio_test::block_on(async {
//! let log = InMemoryEventLog::new();
//! let stored = log
//!     .append(vec![AppendEvent::new("WalletOpened")])
//!     .await
//!     .unwrap();
//! assert_eq!(stored[0].position.get(), 1);
//! # });
//! ```

mod memory;

pub use memory::InMemoryEventLog;

use chrono::{DateTime, Utc};
use dcb_core::Clock;

/// Fixed clock for deterministic tests: always returns the same time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a fixed clock pinned to the given time.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// A fixed clock pinned to 2025-01-01 00:00:00 UTC.
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which cannot happen.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

/// Event construction helpers for tests.
pub mod fixtures {
    use dcb_core::{AppendEvent, Tag};

    /// Build an event with tags given as `(key, value)` pairs.
    ///
    /// # Panics
    ///
    /// Panics on an invalid tag key; fixture input is trusted.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn event(event_type: &str, tags: &[(&str, &str)]) -> AppendEvent {
        AppendEvent::new(event_type).with_tags(
            tags.iter()
                .map(|(k, v)| Tag::new(*k, *v).expect("fixture tag should be valid")),
        )
    }

    /// Build an event with tags and a payload.
    #[must_use]
    pub fn event_with_data(event_type: &str, tags: &[(&str, &str)], data: &[u8]) -> AppendEvent {
        event(event_type, tags).with_data(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }
}
