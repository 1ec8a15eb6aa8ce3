//! Discord gateway adapter for the pin engine.
//!
//! Four pieces: the serenity event handler doing thin payload extraction,
//! the normalizer that filters reactions down to canonical events, the pin
//! capability backed by serenity's HTTP client, and the runtime that feeds
//! events to per-channel workers.

pub mod capability;
pub mod handler;
pub mod normalizer;
pub mod runtime;

pub use capability::SerenityPinCapability;
pub use handler::GatewayHandler;
pub use normalizer::{EventNormalizer, RawReaction};
pub use runtime::PinBridgeRuntime;
