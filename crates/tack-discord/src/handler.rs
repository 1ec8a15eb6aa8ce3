//! Serenity event handler: thin extraction plus a bounded handoff into the
//! runtime's event queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serenity::async_trait;
use serenity::client::{Context, EventHandler};
use serenity::model::channel::{GuildChannel, Message, Reaction};
use serenity::model::gateway::Ready;
use serenity::model::id::{
    ChannelId as DiscordChannelId, GuildId as DiscordGuildId, MessageId as DiscordMessageId,
};
use tack_core::{ChannelId, GatewayEvent, GuildId, MessageId, MessageRef, PinEmoji};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::normalizer::{EventNormalizer, RawReaction};

/// Receives gateway callbacks and forwards normalized events to the worker
/// runtime. `try_send` keeps the gateway task non-blocking; when the queue
/// is full the event is dropped with a warning.
pub struct GatewayHandler {
    normalizer: EventNormalizer,
    events: mpsc::Sender<GatewayEvent>,
    bot_user_id: Arc<AtomicU64>,
}

impl GatewayHandler {
    pub fn new(pin_emoji: PinEmoji, events: mpsc::Sender<GatewayEvent>) -> Self {
        Self {
            normalizer: EventNormalizer::new(pin_emoji),
            events,
            bot_user_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn bot_user_id(&self) -> Option<u64> {
        let id = self.bot_user_id.load(Ordering::SeqCst);
        (id != 0).then_some(id)
    }

    fn forward(&self, event: GatewayEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    channel_id = %event.channel_id(),
                    "event queue full, dropping gateway event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event queue closed, dropping gateway event");
            }
        }
    }

    fn forward_reaction(&self, reaction: &Reaction, added: bool) {
        let raw = RawReaction::from_gateway(reaction, added);
        if let Some(event) = self.normalizer.normalize_reaction(&raw, self.bot_user_id()) {
            self.forward(event);
        }
    }
}

#[async_trait]
impl EventHandler for GatewayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.bot_user_id.store(ready.user.id.get(), Ordering::SeqCst);
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "gateway session ready");
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        self.forward_reaction(&reaction, true);
    }

    async fn reaction_remove(&self, _ctx: Context, reaction: Reaction) {
        self.forward_reaction(&reaction, false);
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: DiscordChannelId,
        message_id: DiscordMessageId,
        guild_id: Option<DiscordGuildId>,
    ) {
        let Some(guild_id) = guild_id else {
            return;
        };
        let message = MessageRef::new(
            GuildId(guild_id.get()),
            ChannelId(channel_id.get()),
            MessageId(message_id.get()),
        );
        self.forward(GatewayEvent::MessageDeleted { message });
    }

    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        self.forward(GatewayEvent::ChannelDeleted {
            channel_id: ChannelId(channel.id.get()),
        });
    }
}
