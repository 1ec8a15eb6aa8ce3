//! Single entry point tying the pipeline stages together.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tack_core::{ChannelId, EngineConfig, GatewayEvent, GuildId, MessageId, MessageRef};
use tack_store::{PinStore, PinStoreError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::capability::PinCapability;
use crate::coordinator::{Decision, ThresholdCoordinator};
use crate::dispatcher::{ActionDispatcher, DispatchError, Dispatched};
use crate::reconciler::CapacityReconciler;

/// Runs normalized gateway events through coordinator, reconciler and
/// dispatcher. One instance is shared by every channel worker; callers are
/// expected to serialize events per channel.
pub struct PinEngine {
    coordinator: ThresholdCoordinator,
    reconciler: CapacityReconciler,
    dispatcher: ActionDispatcher,
    capability: Arc<dyn PinCapability>,
    store: Arc<dyn PinStore>,
    /// Channels whose live pin list has been reconciled this process.
    synced_channels: Mutex<HashSet<ChannelId>>,
}

impl PinEngine {
    pub fn new(
        store: Arc<dyn PinStore>,
        capability: Arc<dyn PinCapability>,
        config: EngineConfig,
    ) -> Self {
        let coordinator = ThresholdCoordinator::new(
            store.clone(),
            config.threshold,
            config.unpin_on_fallback,
        );
        let reconciler = CapacityReconciler::new(store.clone(), config.capacity);
        let dispatcher = ActionDispatcher::new(store.clone(), capability.clone(), config);
        Self {
            coordinator,
            reconciler,
            dispatcher,
            capability,
            store,
            synced_channels: Mutex::new(HashSet::new()),
        }
    }

    pub async fn handle_event(&self, event: GatewayEvent) -> Result<Dispatched, DispatchError> {
        match event {
            GatewayEvent::Reaction(reaction) => {
                let decision = self.coordinator.handle(&reaction).await?;
                self.apply_decision(decision).await
            }
            GatewayEvent::MessageDeleted { message } => {
                self.store.delete(&message).await?;
                self.store
                    .record_unpin(message.channel_id, message.message_id)
                    .await?;
                debug!(%message, "dropped state for deleted message");
                Ok(Dispatched::Nothing)
            }
            GatewayEvent::ChannelDeleted { channel_id } => {
                self.store.purge_channel(channel_id).await?;
                self.synced_channels.lock().await.remove(&channel_id);
                info!(%channel_id, "purged state for deleted channel");
                Ok(Dispatched::Nothing)
            }
        }
    }

    /// Replays persisted state after a restart: garbage-collects leftover
    /// records and re-dispatches any decision the previous process never
    /// carried out.
    pub async fn resume(&self) -> Result<(), PinStoreError> {
        let tracked = self.store.list_tracked().await?;
        info!(records = tracked.len(), "resuming from persisted pin state");
        for (message, record) in tracked {
            if record.reactor_count() == 0 && record.never_pinned() {
                self.store.delete(&message).await?;
                continue;
            }
            let decision = self.coordinator.evaluate(message, &record);
            if matches!(decision, Decision::None) {
                continue;
            }
            if let Err(error) = self.apply_decision(decision).await {
                warn!(%message, %error, "resume action failed, continuing");
            }
        }
        Ok(())
    }

    async fn apply_decision(&self, decision: Decision) -> Result<Dispatched, DispatchError> {
        if let Decision::Pin(message) = decision {
            self.sync_channel_pins(message.guild_id, message.channel_id)
                .await;
        }
        let outcome = self.reconciler.reconcile(decision).await?;
        self.dispatcher.execute(outcome).await
    }

    /// Aligns the stored pin view with the live channel list, once per
    /// channel per process. A failed sync is retried on the next pin.
    async fn sync_channel_pins(&self, guild_id: GuildId, channel_id: ChannelId) {
        {
            let mut synced = self.synced_channels.lock().await;
            if !synced.insert(channel_id) {
                return;
            }
        }
        let live = match self.capability.current_pins(channel_id).await {
            Ok(live) => live,
            Err(error) => {
                warn!(%channel_id, %error, "pin list fetch failed, sync postponed");
                self.synced_channels.lock().await.remove(&channel_id);
                return;
            }
        };
        if let Err(error) = self.reconcile_pin_view(guild_id, channel_id, &live).await {
            warn!(%channel_id, %error, "pin list sync failed, sync postponed");
            self.synced_channels.lock().await.remove(&channel_id);
        }
    }

    /// Drops stored pins the platform no longer has and adopts manual pins
    /// it does. Adopted pins are untracked: they hold a capacity slot but
    /// are never evicted.
    async fn reconcile_pin_view(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        live: &[MessageId],
    ) -> Result<(), PinStoreError> {
        let stored = self.store.list_pinned(channel_id).await?;
        let live_set: HashSet<MessageId> = live.iter().copied().collect();
        for entry in &stored {
            if live_set.contains(&entry.message_id) {
                continue;
            }
            self.store.record_unpin(channel_id, entry.message_id).await?;
            if entry.tracked {
                let message = MessageRef::new(guild_id, channel_id, entry.message_id);
                self.store
                    .upsert(&message, Box::new(|record| record.pinned = false))
                    .await?;
            }
            debug!(%channel_id, message_id = %entry.message_id, "dropped stale pin during sync");
        }
        let stored_set: HashSet<MessageId> =
            stored.iter().map(|entry| entry.message_id).collect();
        let now = Utc::now();
        for message_id in live {
            if stored_set.contains(message_id) {
                continue;
            }
            self.store
                .record_pin(channel_id, *message_id, now, false)
                .await?;
            debug!(%channel_id, %message_id, "adopted manual pin during sync");
        }
        Ok(())
    }
}
