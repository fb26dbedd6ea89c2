//! The projection result pair.

use dcb_core::Cursor;
use serde::{Deserialize, Serialize};

/// The outcome of a projection run: the folded state and the cursor of the
/// last event folded in (or the starting cursor if none matched).
///
/// Feed `cursor` into
/// [`dcb_core::AppendCondition::after`] to make the follow-up append
/// conditional on the projected state still being current.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionResult<S> {
    /// The accumulated state.
    pub state: S,
    /// Where the fold stopped; the snapshot the state reflects.
    pub cursor: Cursor,
}

impl<S> ProjectionResult<S> {
    /// Create a result pair.
    #[must_use]
    pub const fn new(state: S, cursor: Cursor) -> Self {
        Self { state, cursor }
    }
}
