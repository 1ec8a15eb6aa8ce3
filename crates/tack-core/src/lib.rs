//! Shared identifiers, event types, and configuration for tack crates.
//!
//! Everything here is plain data: snowflake newtypes, the canonical reaction
//! event produced by the gateway normalizer, the pin-emoji identity, and the
//! engine configuration assembled by the CLI. No I/O happens in this crate.

pub mod config;
pub mod emoji;
pub mod event;
pub mod ids;

pub use config::{EngineConfig, DEFAULT_PIN_CAPACITY, DEFAULT_THRESHOLD};
pub use emoji::{PinEmoji, PinEmojiParseError};
pub use event::{GatewayEvent, ReactionEvent};
pub use ids::{ChannelId, GuildId, MessageId, MessageRef, UserId};
