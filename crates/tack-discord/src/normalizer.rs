//! Turns raw gateway payloads into canonical engine events.
//!
//! All filtering happens here so the rest of the pipeline never sees foreign
//! emoji, direct-message reactions, or the bot reacting to pins it created
//! itself.

use serenity::model::channel::{Reaction, ReactionType};
use tack_core::{
    ChannelId, GatewayEvent, GuildId, MessageId, MessageRef, PinEmoji, ReactionEvent, UserId,
};
use tracing::trace;

/// Reaction fields lifted off the gateway payload before any filtering.
#[derive(Debug, Clone)]
pub struct RawReaction {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: Option<u64>,
    pub emoji: ReactionType,
    /// True for reaction-add, false for reaction-remove.
    pub added: bool,
}

impl RawReaction {
    pub fn from_gateway(reaction: &Reaction, added: bool) -> Self {
        Self {
            guild_id: reaction.guild_id.map(|id| id.get()),
            channel_id: reaction.channel_id.get(),
            message_id: reaction.message_id.get(),
            user_id: reaction.user_id.map(|id| id.get()),
            emoji: reaction.emoji.clone(),
            added,
        }
    }
}

pub struct EventNormalizer {
    pin_emoji: PinEmoji,
}

impl EventNormalizer {
    pub fn new(pin_emoji: PinEmoji) -> Self {
        Self { pin_emoji }
    }

    /// Produces a canonical reaction event, or `None` when the payload is
    /// filtered out: wrong emoji, a direct message, an anonymous reactor,
    /// or the bot's own reaction.
    pub fn normalize_reaction(
        &self,
        raw: &RawReaction,
        bot_user_id: Option<u64>,
    ) -> Option<GatewayEvent> {
        let Some(guild_id) = raw.guild_id else {
            trace!(channel_id = raw.channel_id, "ignoring direct-message reaction");
            return None;
        };
        let Some(user_id) = raw.user_id else {
            return None;
        };
        if bot_user_id == Some(user_id) {
            return None;
        }
        if !emoji_matches(&raw.emoji, &self.pin_emoji) {
            return None;
        }
        let message = MessageRef::new(
            GuildId(guild_id),
            ChannelId(raw.channel_id),
            MessageId(raw.message_id),
        );
        Some(GatewayEvent::Reaction(ReactionEvent {
            message,
            user_id: UserId(user_id),
            added: raw.added,
        }))
    }
}

/// Unicode emoji compare by literal; custom emoji compare by id so a rename
/// on the server does not break the match.
pub fn emoji_matches(emoji: &ReactionType, pin_emoji: &PinEmoji) -> bool {
    match (emoji, pin_emoji) {
        (ReactionType::Unicode(unicode), PinEmoji::Unicode(expected)) => unicode == expected,
        (ReactionType::Custom { id, .. }, PinEmoji::Custom { id: expected, .. }) => {
            id.get() == *expected
        }
        _ => false,
    }
}
