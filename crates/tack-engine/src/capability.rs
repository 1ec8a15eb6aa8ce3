//! External pin/unpin/notify surface consumed by the dispatcher.

use async_trait::async_trait;
use tack_core::{ChannelId, MessageId};
use thiserror::Error;

/// Failure classes surfaced by the external capability.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// Rate limits, timeouts, transport failures; safe to retry.
    #[error("transient failure: {reason}")]
    Transient {
        reason: String,
        /// Server-provided floor for the next retry, when known.
        retry_after_ms: Option<u64>,
    },
    /// Missing permissions, unknown message or channel; never retried.
    #[error("permanent failure: {reason}")]
    Permanent { reason: String },
    /// The platform rejected a pin because the channel's pin list is full.
    #[error("channel pin limit reached")]
    PinLimitReached,
}

impl CapabilityError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// The only gateway to pin/unpin/notify side effects.
///
/// Implementations perform the real REST calls; the engine never invokes
/// them outside the `ActionDispatcher`.
#[async_trait]
pub trait PinCapability: Send + Sync {
    async fn pin(&self, channel_id: ChannelId, message_id: MessageId)
        -> Result<(), CapabilityError>;
    async fn unpin(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), CapabilityError>;
    /// Message ids currently pinned in the channel, for the pin list sync.
    async fn current_pins(&self, channel_id: ChannelId) -> Result<Vec<MessageId>, CapabilityError>;
    /// Posts an informational message. Callers treat failures as non-fatal.
    async fn notify(&self, channel_id: ChannelId, text: &str) -> Result<(), CapabilityError>;
}
