//! Executes planned actions against the platform and records confirmed
//! outcomes in the store.
//!
//! The store is only mutated after the platform acknowledges a call. A pin
//! that fails permanently leaves the tracked record unpinned; a failed
//! eviction restores the speculatively removed pin with its original
//! timestamp so the channel order is unchanged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tack_core::{ChannelId, EngineConfig, MessageId, MessageRef};
use tack_store::{PinStore, PinStoreError};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::capability::{CapabilityError, PinCapability};
use crate::reconciler::{Action, Reconciled};
use crate::retry;

/// Terminal failure of a dispatched action.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] PinStoreError),
    #[error("platform rejected {operation} for {message}: {reason}")]
    Rejected {
        operation: &'static str,
        message: MessageRef,
        reason: String,
    },
    #[error("{operation} for {message} still failing after {attempts} attempts: {reason}")]
    RetriesExhausted {
        operation: &'static str,
        message: MessageRef,
        attempts: usize,
        reason: String,
    },
}

/// What actually happened after executing a reconciler outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Nothing,
    Pinned(MessageRef),
    Unpinned(MessageRef),
    PinnedWithEviction {
        target: MessageRef,
        evicted: MessageRef,
    },
    CapacityReported {
        channel_id: ChannelId,
        message_id: MessageId,
    },
}

#[derive(Clone, Copy)]
enum PinOp {
    Pin,
    Unpin,
}

impl PinOp {
    fn name(self) -> &'static str {
        match self {
            PinOp::Pin => "pin",
            PinOp::Unpin => "unpin",
        }
    }
}

struct RetryFailure {
    attempts: usize,
    error: CapabilityError,
}

impl RetryFailure {
    fn into_dispatch(self, operation: &'static str, message: MessageRef) -> DispatchError {
        match self.error {
            CapabilityError::Transient { reason, .. } => DispatchError::RetriesExhausted {
                operation,
                message,
                attempts: self.attempts,
                reason,
            },
            CapabilityError::Permanent { reason } => DispatchError::Rejected {
                operation,
                message,
                reason,
            },
            CapabilityError::PinLimitReached => DispatchError::Rejected {
                operation,
                message,
                reason: "pin limit reached".to_string(),
            },
        }
    }
}

pub struct ActionDispatcher {
    store: Arc<dyn PinStore>,
    capability: Arc<dyn PinCapability>,
    config: EngineConfig,
}

impl ActionDispatcher {
    pub fn new(
        store: Arc<dyn PinStore>,
        capability: Arc<dyn PinCapability>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            capability,
            config,
        }
    }

    pub async fn execute(&self, outcome: Reconciled) -> Result<Dispatched, DispatchError> {
        match outcome {
            Reconciled::Nothing => Ok(Dispatched::Nothing),
            Reconciled::CapacityExhausted {
                channel_id,
                message_id,
            } => {
                self.report_capacity(channel_id, message_id).await;
                Ok(Dispatched::CapacityReported {
                    channel_id,
                    message_id,
                })
            }
            Reconciled::Act(Action::DoPin(message)) => self.execute_pin(message).await,
            Reconciled::Act(Action::DoUnpin(message)) => self.execute_unpin(message).await,
            Reconciled::Act(Action::DoPinAndEvict {
                target,
                evicted,
                evicted_pinned_at,
            }) => {
                self.execute_pin_with_eviction(target, evicted, evicted_pinned_at)
                    .await
            }
        }
    }

    async fn execute_pin(&self, message: MessageRef) -> Result<Dispatched, DispatchError> {
        match self.invoke_with_retry(PinOp::Pin, message).await {
            Ok(()) => {
                self.confirm_pin(message).await?;
                Ok(Dispatched::Pinned(message))
            }
            Err(failure) if matches!(failure.error, CapabilityError::PinLimitReached) => {
                self.report_capacity(message.channel_id, message.message_id)
                    .await;
                Ok(Dispatched::CapacityReported {
                    channel_id: message.channel_id,
                    message_id: message.message_id,
                })
            }
            Err(failure) => {
                let error = failure.into_dispatch("pin", message);
                error!(%message, %error, "pin failed, message stays unpinned");
                self.notify_operator(&format!("Failed to pin {}: {error}", message.jump_link()))
                    .await;
                Err(error)
            }
        }
    }

    async fn execute_unpin(&self, message: MessageRef) -> Result<Dispatched, DispatchError> {
        match self.invoke_with_retry(PinOp::Unpin, message).await {
            Ok(()) => {
                self.store
                    .record_unpin(message.channel_id, message.message_id)
                    .await?;
                self.store
                    .upsert(&message, Box::new(|record| record.pinned = false))
                    .await?;
                Ok(Dispatched::Unpinned(message))
            }
            Err(failure) => {
                let error = failure.into_dispatch("unpin", message);
                error!(%message, %error, "unpin failed, message stays pinned");
                Err(error)
            }
        }
    }

    async fn execute_pin_with_eviction(
        &self,
        target: MessageRef,
        evicted: MessageRef,
        evicted_pinned_at: DateTime<Utc>,
    ) -> Result<Dispatched, DispatchError> {
        if let Err(failure) = self.invoke_with_retry(PinOp::Unpin, evicted).await {
            self.restore_evicted(evicted, evicted_pinned_at).await?;
            let error = failure.into_dispatch("unpin", evicted);
            error!(message = %evicted, %error, "eviction unpin failed, restored the evicted pin");
            return Err(error);
        }
        match self.invoke_with_retry(PinOp::Pin, target).await {
            Ok(()) => {
                self.confirm_pin(target).await?;
                Ok(Dispatched::PinnedWithEviction { target, evicted })
            }
            Err(failure) if matches!(failure.error, CapabilityError::PinLimitReached) => {
                self.report_capacity(target.channel_id, target.message_id)
                    .await;
                Ok(Dispatched::CapacityReported {
                    channel_id: target.channel_id,
                    message_id: target.message_id,
                })
            }
            Err(failure) => {
                // The victim is already gone on both sides, so the state is
                // consistent even though the target did not make it in.
                let error = failure.into_dispatch("pin", target);
                error!(message = %target, %error, "pin after eviction failed, slot stays free");
                self.notify_operator(&format!("Failed to pin {}: {error}", target.jump_link()))
                    .await;
                Err(error)
            }
        }
    }

    /// Records a platform-confirmed pin and announces it in the channel.
    async fn confirm_pin(&self, message: MessageRef) -> Result<(), PinStoreError> {
        let pinned_at = Utc::now();
        self.store
            .record_pin(message.channel_id, message.message_id, pinned_at, true)
            .await?;
        let record = self
            .store
            .upsert(
                &message,
                Box::new(move |record| {
                    record.pinned = true;
                    record.pinned_at = Some(pinned_at);
                }),
            )
            .await?;
        if self.config.announce_pins {
            let text = format!(
                "{} Message pinned with {} reactions: {}",
                self.config.pin_emoji,
                record.reactor_count(),
                message.jump_link()
            );
            if let Err(error) = self.capability.notify(message.channel_id, &text).await {
                warn!(%message, %error, "pin announcement failed");
            }
        }
        Ok(())
    }

    async fn restore_evicted(
        &self,
        victim: MessageRef,
        pinned_at: DateTime<Utc>,
    ) -> Result<(), PinStoreError> {
        self.store
            .record_pin(victim.channel_id, victim.message_id, pinned_at, true)
            .await?;
        self.store
            .upsert(
                &victim,
                Box::new(move |record| {
                    record.pinned = true;
                    record.pinned_at = Some(pinned_at);
                }),
            )
            .await?;
        Ok(())
    }

    async fn report_capacity(&self, channel_id: ChannelId, message_id: MessageId) {
        warn!(%channel_id, %message_id, "pin capacity exhausted, no tracked pin to evict");
        let notice = format!(
            "Pin list for <#{channel_id}> is full and no auto-pinned message can make room; \
             message {message_id} stays unpinned."
        );
        let target = self.config.operator_channel.unwrap_or(channel_id);
        if let Err(error) = self.capability.notify(target, &notice).await {
            warn!(channel_id = %target, %error, "capacity notice failed");
        }
    }

    async fn notify_operator(&self, text: &str) {
        let Some(channel_id) = self.config.operator_channel else {
            return;
        };
        if let Err(error) = self.capability.notify(channel_id, text).await {
            warn!(%channel_id, %error, "operator notice failed");
        }
    }

    async fn invoke_with_retry(
        &self,
        operation: PinOp,
        message: MessageRef,
    ) -> Result<(), RetryFailure> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let outcome = match operation {
                PinOp::Pin => {
                    self.capability
                        .pin(message.channel_id, message.message_id)
                        .await
                }
                PinOp::Unpin => {
                    self.capability
                        .unpin(message.channel_id, message.message_id)
                        .await
                }
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(CapabilityError::Transient {
                    reason,
                    retry_after_ms,
                }) if attempt < self.config.retry_max_attempts => {
                    let delay_ms = retry::retry_delay_ms(attempt, true, retry_after_ms);
                    warn!(
                        operation = operation.name(),
                        %message,
                        attempt,
                        delay_ms,
                        reason = %reason,
                        "transient platform failure, backing off"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(error) => return Err(RetryFailure { attempts: attempt, error }),
            }
        }
    }
}
