//! Threshold decisions over idempotent per-message reaction state.

use std::sync::Arc;
use tack_core::{MessageRef, ReactionEvent};
use tack_store::{PinStore, StoreResult, TrackedMessage};

/// Outcome of applying one reaction event to tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    None,
    Pin(MessageRef),
    Unpin(MessageRef),
}

/// Decision engine: updates the reactor set for an event and decides whether
/// a pin or unpin must be issued. Idempotent under duplicate or replayed
/// events by construction of set semantics.
pub struct ThresholdCoordinator {
    store: Arc<dyn PinStore>,
    threshold: usize,
    unpin_on_fallback: bool,
}

impl ThresholdCoordinator {
    pub fn new(store: Arc<dyn PinStore>, threshold: usize, unpin_on_fallback: bool) -> Self {
        Self {
            store,
            threshold,
            unpin_on_fallback,
        }
    }

    /// Applies the event to the store and returns the implied decision.
    ///
    /// A store failure leaves the event unconsumed; redelivery is safe
    /// because both mutations are set operations.
    pub async fn handle(&self, event: &ReactionEvent) -> StoreResult<Decision> {
        if event.added {
            self.handle_add(event).await
        } else {
            self.handle_remove(event).await
        }
    }

    /// Decision implied by already-persisted state, used by the startup
    /// resume sweep. Mirrors `handle` without consuming an event.
    pub fn evaluate(&self, message: MessageRef, record: &TrackedMessage) -> Decision {
        if !record.pinned && record.reactor_count() >= self.threshold {
            return Decision::Pin(message);
        }
        if self.unpin_on_fallback && record.pinned && record.reactor_count() < self.threshold {
            return Decision::Unpin(message);
        }
        Decision::None
    }

    async fn handle_add(&self, event: &ReactionEvent) -> StoreResult<Decision> {
        let user_id = event.user_id;
        let record = self
            .store
            .upsert(
                &event.message,
                Box::new(move |record| {
                    record.reactors.insert(user_id);
                }),
            )
            .await?;

        if !record.pinned && record.reactor_count() >= self.threshold {
            return Ok(Decision::Pin(event.message));
        }
        Ok(Decision::None)
    }

    async fn handle_remove(&self, event: &ReactionEvent) -> StoreResult<Decision> {
        // A removal for an untracked message must not create a record.
        if self.store.get(&event.message).await?.is_none() {
            return Ok(Decision::None);
        }

        let user_id = event.user_id;
        let record = self
            .store
            .upsert(
                &event.message,
                Box::new(move |record| {
                    record.reactors.remove(&user_id);
                }),
            )
            .await?;

        if record.reactors.is_empty() && record.never_pinned() {
            self.store.delete(&event.message).await?;
            return Ok(Decision::None);
        }
        if self.unpin_on_fallback && record.pinned && record.reactor_count() < self.threshold {
            return Ok(Decision::Unpin(event.message));
        }
        Ok(Decision::None)
    }
}
