//! Capacity enforcement and eviction planning over the channel pin set.

use crate::coordinator::Decision;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tack_core::{ChannelId, MessageId, MessageRef};
use tack_store::{PinStore, StoreResult};

/// Side effect the dispatcher must perform for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DoPin(MessageRef),
    DoUnpin(MessageRef),
    /// Evict first, then pin. The victim's store state is already marked
    /// unpinned speculatively; `evicted_pinned_at` lets the dispatcher roll
    /// that mark back to its original eviction-order position on failure.
    DoPinAndEvict {
        target: MessageRef,
        evicted: MessageRef,
        evicted_pinned_at: DateTime<Utc>,
    },
}

/// Result of fitting a decision into the channel's pin capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Nothing,
    Act(Action),
    /// Channel full and nothing evictable; reportable, not actionable.
    CapacityExhausted {
        channel_id: ChannelId,
        message_id: MessageId,
    },
}

/// Enforces the per-channel pin-slot limit and picks eviction victims,
/// oldest bot-tracked pin first. Manually pinned messages count toward
/// capacity but are never evicted.
pub struct CapacityReconciler {
    store: Arc<dyn PinStore>,
    capacity: usize,
}

impl CapacityReconciler {
    pub fn new(store: Arc<dyn PinStore>, capacity: usize) -> Self {
        Self { store, capacity }
    }

    pub async fn reconcile(&self, decision: Decision) -> StoreResult<Reconciled> {
        match decision {
            Decision::None => Ok(Reconciled::Nothing),
            Decision::Unpin(message) => Ok(Reconciled::Act(Action::DoUnpin(message))),
            Decision::Pin(message) => self.plan_pin(message).await,
        }
    }

    async fn plan_pin(&self, message: MessageRef) -> StoreResult<Reconciled> {
        let pinned = self.store.list_pinned(message.channel_id).await?;
        if pinned.len() < self.capacity {
            return Ok(Reconciled::Act(Action::DoPin(message)));
        }

        let victim = pinned
            .iter()
            .find(|entry| entry.tracked && entry.message_id != message.message_id);
        let Some(victim) = victim else {
            return Ok(Reconciled::CapacityExhausted {
                channel_id: message.channel_id,
                message_id: message.message_id,
            });
        };

        let evicted = MessageRef::new(message.guild_id, message.channel_id, victim.message_id);
        let evicted_pinned_at = victim.pinned_at;

        // Speculative unpin: the channel is never observably over capacity
        // even if the dispatcher fails between the two steps.
        self.store
            .record_unpin(evicted.channel_id, evicted.message_id)
            .await?;
        self.store
            .upsert(
                &evicted,
                Box::new(|record| {
                    record.pinned = false;
                }),
            )
            .await?;

        Ok(Reconciled::Act(Action::DoPinAndEvict {
            target: message,
            evicted,
            evicted_pinned_at,
        }))
    }
}
