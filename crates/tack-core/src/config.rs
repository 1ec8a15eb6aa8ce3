//! Runtime settings consumed by the pin engine.

use crate::emoji::PinEmoji;
use crate::ids::ChannelId;

/// Discord caps a channel at 50 pinned messages.
pub const DEFAULT_PIN_CAPACITY: usize = 50;

/// Distinct reactors required before a message is auto-pinned.
pub const DEFAULT_THRESHOLD: usize = 3;

/// Settings that shape engine decisions, assembled by the CLI layer.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pin_emoji: PinEmoji,
    pub threshold: usize,
    pub capacity: usize,
    /// Auto-unpin when the reactor count falls back below the threshold.
    pub unpin_on_fallback: bool,
    /// Post a jump-link announcement after each confirmed auto-pin.
    pub announce_pins: bool,
    /// Channel for capacity and failure notices; falls back to the event
    /// channel for capacity notices when unset.
    pub operator_channel: Option<ChannelId>,
    /// Total dispatcher attempts per action, first try included.
    pub retry_max_attempts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pin_emoji: PinEmoji::Unicode("📌".to_string()),
            threshold: DEFAULT_THRESHOLD,
            capacity: DEFAULT_PIN_CAPACITY,
            unpin_on_fallback: true,
            announce_pins: true,
            operator_channel: None,
            retry_max_attempts: 4,
        }
    }
}
