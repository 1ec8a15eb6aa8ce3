//! Pin state store abstractions and in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;

mod sqlite;

pub use sqlite::SqlitePinStore;
pub use tack_core::{ChannelId, GuildId, MessageId, MessageRef, UserId};

/// Result type for pin store operations.
pub type StoreResult<T> = Result<T, PinStoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum PinStoreError {
    #[error("identifier '{field}' out of range: {value}")]
    IdentifierOutOfRange { field: &'static str, value: u64 },
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Durable reaction and pin state for one tracked message.
///
/// `reactors` carries set semantics: a user's pin-emoji reaction is a toggle,
/// so re-adding an existing member is a no-op. `pinned` mirrors the last
/// confirmed platform state and is never set optimistically. `pinned_at`
/// survives an unpin so that "never pinned" is exactly `pinned_at.is_none()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedMessage {
    pub reactors: BTreeSet<UserId>,
    pub pinned: bool,
    pub pinned_at: Option<DateTime<Utc>>,
}

impl TrackedMessage {
    pub fn reactor_count(&self) -> usize {
        self.reactors.len()
    }

    pub fn never_pinned(&self) -> bool {
        self.pinned_at.is_none()
    }
}

/// One entry in a channel's ordered pin set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinEntry {
    pub message_id: MessageId,
    pub pinned_at: DateTime<Utc>,
    /// False for pins this bot observed in the channel but did not create;
    /// those count toward capacity and are never eviction candidates.
    pub tracked: bool,
}

/// Mutation applied under the store's atomic read-modify-write.
pub type Mutator = Box<dyn FnOnce(&mut TrackedMessage) + Send>;

/// Async store contract shared by the coordinator, reconciler, and dispatcher.
///
/// Every operation is durable before it returns success; a crash immediately
/// after a successful call must not lose the update.
#[async_trait]
pub trait PinStore: Send + Sync {
    async fn get(&self, message: &MessageRef) -> StoreResult<Option<TrackedMessage>>;
    /// Atomic read-modify-write; creates a default record when absent.
    async fn upsert(&self, message: &MessageRef, mutate: Mutator) -> StoreResult<TrackedMessage>;
    async fn delete(&self, message: &MessageRef) -> StoreResult<()>;
    /// Every tracked message, for the startup resume sweep.
    async fn list_tracked(&self) -> StoreResult<Vec<(MessageRef, TrackedMessage)>>;

    /// Channel pin set ordered by pin time, oldest first.
    async fn list_pinned(&self, channel_id: ChannelId) -> StoreResult<Vec<PinEntry>>;
    async fn record_pin(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        pinned_at: DateTime<Utc>,
        tracked: bool,
    ) -> StoreResult<()>;
    async fn record_unpin(&self, channel_id: ChannelId, message_id: MessageId) -> StoreResult<()>;

    /// Drops every record for a deleted channel.
    async fn purge_channel(&self, channel_id: ChannelId) -> StoreResult<()>;
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryPinStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    messages: HashMap<MessageRef, TrackedMessage>,
    channel_pins: HashMap<ChannelId, Vec<PinEntry>>,
}

impl InMemoryPinStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PinStore for InMemoryPinStore {
    async fn get(&self, message: &MessageRef) -> StoreResult<Option<TrackedMessage>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(message).cloned())
    }

    async fn upsert(&self, message: &MessageRef, mutate: Mutator) -> StoreResult<TrackedMessage> {
        let mut inner = self.inner.write().await;
        let record = inner.messages.entry(*message).or_default();
        mutate(record);
        Ok(record.clone())
    }

    async fn delete(&self, message: &MessageRef) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.messages.remove(message);
        Ok(())
    }

    async fn list_tracked(&self) -> StoreResult<Vec<(MessageRef, TrackedMessage)>> {
        let inner = self.inner.read().await;
        let mut tracked: Vec<_> = inner
            .messages
            .iter()
            .map(|(message, record)| (*message, record.clone()))
            .collect();
        tracked.sort_by_key(|(message, _)| *message);
        Ok(tracked)
    }

    async fn list_pinned(&self, channel_id: ChannelId) -> StoreResult<Vec<PinEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .channel_pins
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_pin(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        pinned_at: DateTime<Utc>,
        tracked: bool,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let pins = inner.channel_pins.entry(channel_id).or_default();
        pins.retain(|entry| entry.message_id != message_id);
        pins.push(PinEntry {
            message_id,
            pinned_at,
            tracked,
        });
        pins.sort_by_key(|entry| entry.pinned_at);
        Ok(())
    }

    async fn record_unpin(&self, channel_id: ChannelId, message_id: MessageId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let now_empty = match inner.channel_pins.get_mut(&channel_id) {
            Some(pins) => {
                pins.retain(|entry| entry.message_id != message_id);
                pins.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.channel_pins.remove(&channel_id);
        }
        Ok(())
    }

    async fn purge_channel(&self, channel_id: ChannelId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.channel_pins.remove(&channel_id);
        inner
            .messages
            .retain(|message, _| message.channel_id != channel_id);
        Ok(())
    }
}
