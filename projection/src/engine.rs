//! Batched, cancellable replay of matching events through a projector.

use crate::result::ProjectionResult;
use dcb_core::error::ProjectionError;
use dcb_core::{Cursor, EventLog, Query, StateProjector};
use futures::StreamExt;
use tokio::sync::watch;

/// Default number of events fetched per scan page.
pub const DEFAULT_BATCH_SIZE: u64 = 1_000;

/// Streams matching events out of an [`EventLog`] and folds them through a
/// [`StateProjector`].
///
/// The engine never loads the full log into memory: it pages the scan in
/// bounded batches, restarting each page from the last seen cursor. A page
/// boundary is also the cancellation point - see
/// [`ProjectionEngine::with_cancellation`].
///
/// # Determinism
///
/// Two runs over the same log prefix with the same query and projector
/// yield identical `(state, cursor)` pairs; projectors are required to be
/// pure.
pub struct ProjectionEngine<L> {
    log: L,
    batch_size: u64,
    cancel: Option<watch::Receiver<bool>>,
}

impl<L: EventLog> ProjectionEngine<L> {
    /// Create an engine over a log handle with the default batch size.
    #[must_use]
    pub const fn new(log: L) -> Self {
        Self {
            log,
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: None,
        }
    }

    /// Set the scan page size. Values below 1 are clamped to 1.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = if batch_size == 0 { 1 } else { batch_size };
        self
    }

    /// Attach a cancellation signal, observed at each batch boundary.
    ///
    /// Send `true` to stop the run; the engine returns
    /// [`ProjectionError::Cancelled`] instead of a partial result.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The underlying log handle.
    pub const fn log(&self) -> &L {
        &self.log
    }

    /// Replay events matching `query` after `from`, folding them through
    /// `projector`; returns the final state and the cursor of the last
    /// event seen.
    ///
    /// The cursor advances for every scanned event, including events the
    /// projector's type filter skips - the returned cursor always reflects
    /// how far the log was observed, which is what the follow-up
    /// conditional append must assert against.
    ///
    /// If no event matches, returns `(initial_state, from)`.
    ///
    /// # Errors
    ///
    /// - [`ProjectionError::Log`]: the underlying scan failed.
    /// - [`ProjectionError::Projector`]: `transition` failed; the fold is
    ///   unwound and state past that event is undefined.
    /// - [`ProjectionError::Cancelled`]: the cancellation signal fired.
    pub async fn project<P: StateProjector>(
        &self,
        query: Query,
        from: Cursor,
        projector: &P,
    ) -> Result<ProjectionResult<P::State>, ProjectionError> {
        let mut cursor = from;
        let mut state = projector.initial_state();
        let mut total: u64 = 0;

        loop {
            if self.is_cancelled() {
                tracing::debug!(
                    projector = projector.id(),
                    events = total,
                    "Projection cancelled at batch boundary"
                );
                return Err(ProjectionError::Cancelled);
            }

            let mut page = self
                .log
                .scan(query.clone(), cursor.clone(), Some(self.batch_size));
            let mut page_len: u64 = 0;

            while let Some(item) = page.next().await {
                let event = item.map_err(ProjectionError::from)?;
                page_len += 1;

                if projector.wants(&event.event_type) {
                    state = projector.transition(state, &event).map_err(|source| {
                        ProjectionError::Projector {
                            id: projector.id().to_string(),
                            source,
                        }
                    })?;
                }
                cursor = Cursor::from_event(&event);
            }
            drop(page);

            total += page_len;
            if page_len < self.batch_size {
                break;
            }
        }

        tracing::debug!(
            projector = projector.id(),
            events = total,
            position = cursor.position.get(),
            "Projection complete"
        );
        Ok(ProjectionResult::new(state, cursor))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }
}
