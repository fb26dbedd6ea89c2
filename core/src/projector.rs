//! State projectors: pure folds from events to decision state.
//!
//! A [`StateProjector`] declares which event types it consumes, its initial
//! state, and a deterministic `transition` function. The projection engine
//! feeds it every matching event in commit order; the result plus the last
//! cursor is what a caller needs to build a conditional append.
//!
//! # Deserialization
//!
//! Payload bytes stay opaque to the store. A projector that needs the
//! payload owns its codec - injected at construction - and decodes inside
//! `transition`. Decode failures surface as [`TransitionError`] and unwind
//! the projection.
//!
//! # Composition
//!
//! [`zip`] combines two projectors into one whose state is the pair of
//! their states. Both see every matching event, each filtered by its own
//! `event_types`. Nest zips for wider records; this is how a multi-entity
//! decision (say, the two wallets of a transfer) folds in a single pass.

use crate::error::TransitionError;
use crate::event::{EventType, StoredEvent};

/// A pure `(state, event) -> state` fold with routing metadata.
///
/// `transition` must be deterministic and side-effect free; the engine may
/// replay the same event across restarts, and two projections over the same
/// log prefix must produce identical state.
pub trait StateProjector: Send + Sync {
    /// The accumulator type.
    type State: Send;

    /// Unique projector name, used in error attribution.
    fn id(&self) -> &str;

    /// Event types this projector consumes; an empty slice means all.
    fn event_types(&self) -> &[EventType];

    /// The starting value of the fold.
    fn initial_state(&self) -> Self::State;

    /// Fold one event into the state.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] on e.g. payload decode failure; the
    /// engine unwinds the projection and attributes the error to
    /// [`StateProjector::id`].
    fn transition(
        &self,
        state: Self::State,
        event: &StoredEvent,
    ) -> Result<Self::State, TransitionError>;

    /// Whether this projector consumes the given event type.
    fn wants(&self, event_type: &EventType) -> bool {
        self.event_types().is_empty() || self.event_types().contains(event_type)
    }
}

/// A projector built from a closure.
///
/// # Examples
///
/// ```
/// use dcb_core::projector::{FnProjector, StateProjector};
///
/// let counter = FnProjector::new("event-counter", 0u64, |count, _event| Ok(count + 1));
/// assert_eq!(counter.initial_state(), 0);
/// ```
pub struct FnProjector<S, F> {
    id: String,
    event_types: Vec<EventType>,
    initial: S,
    transition: F,
}

impl<S, F> FnProjector<S, F>
where
    S: Clone + Send + Sync,
    F: Fn(S, &StoredEvent) -> Result<S, TransitionError> + Send + Sync,
{
    /// Create a projector from an id, an initial state, and a fold closure.
    /// Consumes all event types until narrowed with
    /// [`FnProjector::with_event_types`].
    #[must_use]
    pub fn new(id: impl Into<String>, initial: S, transition: F) -> Self {
        Self {
            id: id.into(),
            event_types: Vec::new(),
            initial,
            transition,
        }
    }

    /// Restrict the projector to the given event types.
    #[must_use]
    pub fn with_event_types(
        mut self,
        event_types: impl IntoIterator<Item = impl Into<EventType>>,
    ) -> Self {
        self.event_types = event_types.into_iter().map(Into::into).collect();
        self
    }
}

impl<S, F> StateProjector for FnProjector<S, F>
where
    S: Clone + Send + Sync,
    F: Fn(S, &StoredEvent) -> Result<S, TransitionError> + Send + Sync,
{
    type State = S;

    fn id(&self) -> &str {
        &self.id
    }

    fn event_types(&self) -> &[EventType] {
        &self.event_types
    }

    fn initial_state(&self) -> S {
        self.initial.clone()
    }

    fn transition(&self, state: S, event: &StoredEvent) -> Result<S, TransitionError> {
        (self.transition)(state, event)
    }
}

/// Two projectors folded side by side; state is the pair of their states.
///
/// Built with [`zip`]. The combined `event_types` is the union of the
/// parts' sets, or "all" if either part consumes all; each part still
/// filters events through its own [`StateProjector::wants`].
pub struct Zip<A, B> {
    id: String,
    event_types: Vec<EventType>,
    a: A,
    b: B,
}

/// Combine two projectors into one scanning pass.
///
/// # Examples
///
/// ```
/// use dcb_core::projector::{zip, FnProjector, StateProjector};
///
/// let deposits = FnProjector::new("deposits", 0u64, |n, _e| Ok(n + 1))
///     .with_event_types(["DepositMade"]);
/// let withdrawals = FnProjector::new("withdrawals", 0u64, |n, _e| Ok(n + 1))
///     .with_event_types(["WithdrawalMade"]);
///
/// let both = zip(deposits, withdrawals);
/// assert_eq!(both.initial_state(), (0, 0));
/// assert_eq!(both.event_types().len(), 2);
/// ```
#[must_use]
pub fn zip<A: StateProjector, B: StateProjector>(a: A, b: B) -> Zip<A, B> {
    let event_types = if a.event_types().is_empty() || b.event_types().is_empty() {
        Vec::new()
    } else {
        let mut union: Vec<EventType> = a
            .event_types()
            .iter()
            .chain(b.event_types())
            .cloned()
            .collect();
        union.sort();
        union.dedup();
        union
    };

    Zip {
        id: format!("{}+{}", a.id(), b.id()),
        event_types,
        a,
        b,
    }
}

impl<A: StateProjector, B: StateProjector> StateProjector for Zip<A, B> {
    type State = (A::State, B::State);

    fn id(&self) -> &str {
        &self.id
    }

    fn event_types(&self) -> &[EventType] {
        &self.event_types
    }

    fn initial_state(&self) -> Self::State {
        (self.a.initial_state(), self.b.initial_state())
    }

    fn transition(
        &self,
        state: Self::State,
        event: &StoredEvent,
    ) -> Result<Self::State, TransitionError> {
        let (state_a, state_b) = state;
        let state_a = if self.a.wants(&event.event_type) {
            self.a.transition(state_a, event)?
        } else {
            state_a
        };
        let state_b = if self.b.wants(&event.event_type) {
            self.b.transition(state_b, event)?
        } else {
            state_b
        };
        Ok((state_a, state_b))
    }
}
