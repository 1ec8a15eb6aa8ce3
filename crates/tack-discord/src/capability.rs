//! Pin capability backed by serenity's HTTP client.
//!
//! Maps Discord REST failures onto the engine's error taxonomy. Serenity
//! retries per-route rate limits internally, so a surfaced 429 is the global
//! limit and worth our own backoff.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::{Http, HttpError};
use serenity::model::id::{ChannelId as DiscordChannelId, MessageId as DiscordMessageId};
use tack_core::{ChannelId, MessageId};
use tack_engine::{CapabilityError, PinCapability};

const ERROR_CODE_UNKNOWN_CHANNEL: isize = 10_003;
const ERROR_CODE_UNKNOWN_MESSAGE: isize = 10_008;
const ERROR_CODE_MAX_PINS: isize = 30_003;
const ERROR_CODE_MISSING_ACCESS: isize = 50_001;
const ERROR_CODE_MISSING_PERMISSIONS: isize = 50_013;

pub struct SerenityPinCapability {
    http: Arc<Http>,
}

impl SerenityPinCapability {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PinCapability for SerenityPinCapability {
    async fn pin(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), CapabilityError> {
        self.http
            .pin_message(
                DiscordChannelId::new(channel_id.0),
                DiscordMessageId::new(message_id.0),
                Some("reaction threshold reached"),
            )
            .await
            .map_err(map_error)
    }

    async fn unpin(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), CapabilityError> {
        self.http
            .unpin_message(
                DiscordChannelId::new(channel_id.0),
                DiscordMessageId::new(message_id.0),
                Some("auto-pin housekeeping"),
            )
            .await
            .map_err(map_error)
    }

    async fn current_pins(&self, channel_id: ChannelId) -> Result<Vec<MessageId>, CapabilityError> {
        let pins = self
            .http
            .get_pins(DiscordChannelId::new(channel_id.0))
            .await
            .map_err(map_error)?;
        Ok(pins
            .into_iter()
            .map(|message| MessageId(message.id.get()))
            .collect())
    }

    async fn notify(&self, channel_id: ChannelId, text: &str) -> Result<(), CapabilityError> {
        DiscordChannelId::new(channel_id.0)
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(map_error)
    }
}

fn map_error(error: serenity::Error) -> CapabilityError {
    match error {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => classify_response(
            response.status_code.as_u16(),
            response.error.code,
            &response.error.message,
        ),
        other => CapabilityError::Transient {
            reason: other.to_string(),
            retry_after_ms: None,
        },
    }
}

fn classify_response(status: u16, code: isize, message: &str) -> CapabilityError {
    if code == ERROR_CODE_MAX_PINS {
        return CapabilityError::PinLimitReached;
    }
    if status == 429 {
        return CapabilityError::Transient {
            reason: format!("rate limited: {message}"),
            retry_after_ms: None,
        };
    }
    if status >= 500 {
        return CapabilityError::Transient {
            reason: format!("discord {status}: {message}"),
            retry_after_ms: None,
        };
    }
    match code {
        ERROR_CODE_UNKNOWN_CHANNEL
        | ERROR_CODE_UNKNOWN_MESSAGE
        | ERROR_CODE_MISSING_ACCESS
        | ERROR_CODE_MISSING_PERMISSIONS => CapabilityError::Permanent {
            reason: format!("discord {code}: {message}"),
        },
        _ => CapabilityError::Permanent {
            reason: format!("discord {status} (code {code}): {message}"),
        },
    }
}
