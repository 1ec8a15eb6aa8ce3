//! Decision pipeline for reaction-threshold pinning.
//!
//! Three stages sit between the gateway normalizer and the Discord REST
//! surface: the `ThresholdCoordinator` turns a reaction event into a pin or
//! unpin decision, the `CapacityReconciler` fits that decision into the
//! channel's pin-slot capacity (choosing an eviction victim when full), and the
//! `ActionDispatcher` performs the external side effects with bounded retry
//! and writes confirmed state back to the store. `PinEngine` wires the three
//! together and adds the startup resume sweep plus the lazy per-channel pin
//! list sync.

pub mod capability;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod reconciler;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use capability::{CapabilityError, PinCapability};
pub use coordinator::{Decision, ThresholdCoordinator};
pub use dispatcher::{ActionDispatcher, DispatchError, Dispatched};
pub use engine::PinEngine;
pub use reconciler::{Action, CapacityReconciler, Reconciled};
