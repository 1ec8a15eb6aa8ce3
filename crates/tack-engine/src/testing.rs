//! Scripted capability used by the unit tests in this crate.

use crate::capability::{CapabilityError, PinCapability};
use async_trait::async_trait;
use std::collections::VecDeque;
use tack_core::{ChannelId, MessageId};
use tokio::sync::Mutex;

/// Records every call and replays queued outcomes; an empty queue means the
/// call succeeds.
#[derive(Default)]
pub(crate) struct ScriptedCapability {
    pin_outcomes: Mutex<VecDeque<Result<(), CapabilityError>>>,
    unpin_outcomes: Mutex<VecDeque<Result<(), CapabilityError>>>,
    live_pins: Mutex<Vec<MessageId>>,
    pub pin_calls: Mutex<Vec<(ChannelId, MessageId)>>,
    pub unpin_calls: Mutex<Vec<(ChannelId, MessageId)>>,
    pub notices: Mutex<Vec<(ChannelId, String)>>,
}

impl ScriptedCapability {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn queue_pin_outcome(&self, outcome: Result<(), CapabilityError>) {
        self.pin_outcomes.lock().await.push_back(outcome);
    }

    pub async fn queue_unpin_outcome(&self, outcome: Result<(), CapabilityError>) {
        self.unpin_outcomes.lock().await.push_back(outcome);
    }

    pub async fn set_live_pins(&self, pins: Vec<MessageId>) {
        *self.live_pins.lock().await = pins;
    }
}

#[async_trait]
impl PinCapability for ScriptedCapability {
    async fn pin(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), CapabilityError> {
        self.pin_calls.lock().await.push((channel_id, message_id));
        self.pin_outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn unpin(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), CapabilityError> {
        self.unpin_calls.lock().await.push((channel_id, message_id));
        self.unpin_outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn current_pins(&self, _channel_id: ChannelId) -> Result<Vec<MessageId>, CapabilityError> {
        Ok(self.live_pins.lock().await.clone())
    }

    async fn notify(&self, channel_id: ChannelId, text: &str) -> Result<(), CapabilityError> {
        self.notices
            .lock()
            .await
            .push((channel_id, text.to_string()));
        Ok(())
    }
}
