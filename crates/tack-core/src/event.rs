//! Canonical events produced by the gateway normalizer.

use crate::ids::{ChannelId, MessageRef, UserId};

/// A pin-emoji reaction toggle on a guild message, already filtered down to
/// the configured emoji and stripped of the bot's own reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionEvent {
    pub message: MessageRef,
    pub user_id: UserId,
    /// True for reaction-add, false for reaction-remove.
    pub added: bool,
}

/// Normalized gateway event consumed by the pin engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Reaction(ReactionEvent),
    MessageDeleted { message: MessageRef },
    ChannelDeleted { channel_id: ChannelId },
}

impl GatewayEvent {
    /// Channel the event belongs to; the runtime serializes work per channel.
    pub fn channel_id(&self) -> ChannelId {
        match self {
            Self::Reaction(event) => event.message.channel_id,
            Self::MessageDeleted { message } => message.channel_id,
            Self::ChannelDeleted { channel_id } => *channel_id,
        }
    }
}
