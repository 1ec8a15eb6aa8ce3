//! Per-channel worker runtime between the gateway handler and the engine.
//!
//! Events for the same channel run strictly one at a time; different
//! channels proceed in parallel. The ingress bound lives in the mpsc
//! channel: while internal queues are at capacity the receiver is not
//! polled, so the handler's `try_send` starts dropping.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tack_core::{ChannelId, GatewayEvent};
use tack_engine::{DispatchError, Dispatched, PinEngine};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

struct ActiveChannelRun {
    handle: JoinHandle<RunTaskResult>,
}

struct RunTaskResult {
    channel_id: ChannelId,
    outcome: Result<Dispatched, DispatchError>,
}

pub struct PinBridgeRuntime {
    engine: Arc<PinEngine>,
    events: mpsc::Receiver<GatewayEvent>,
    shutdown: watch::Receiver<bool>,
    shutdown_grace: Duration,
    queue_capacity: usize,
    active_runs: HashMap<ChannelId, ActiveChannelRun>,
    channel_queues: HashMap<ChannelId, VecDeque<GatewayEvent>>,
}

impl PinBridgeRuntime {
    pub fn new(
        engine: Arc<PinEngine>,
        events: mpsc::Receiver<GatewayEvent>,
        shutdown: watch::Receiver<bool>,
        shutdown_grace: Duration,
        queue_capacity: usize,
    ) -> Self {
        Self {
            engine,
            events,
            shutdown,
            shutdown_grace,
            queue_capacity: queue_capacity.max(1),
            active_runs: HashMap::new(),
            channel_queues: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        info!("pin bridge runtime started");
        loop {
            self.drain_finished_runs().await;
            self.try_start_queued_runs();

            let backlog = self.queued_events();
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                maybe_event = self.events.recv(), if backlog < self.queue_capacity => {
                    let Some(event) = maybe_event else {
                        break;
                    };
                    self.channel_queues
                        .entry(event.channel_id())
                        .or_default()
                        .push_back(event);
                }
                _ = sleep(Duration::from_millis(50)) => {}
            }
        }
        self.drain_on_shutdown().await;
        info!("pin bridge runtime stopped");
    }

    fn queued_events(&self) -> usize {
        self.channel_queues.values().map(VecDeque::len).sum()
    }

    fn try_start_queued_runs(&mut self) {
        let channels: Vec<ChannelId> = self.channel_queues.keys().copied().collect();
        for channel_id in channels {
            if self.active_runs.contains_key(&channel_id) {
                continue;
            }
            let Some(event) = self
                .channel_queues
                .get_mut(&channel_id)
                .and_then(|queue| queue.pop_front())
            else {
                continue;
            };
            if self
                .channel_queues
                .get(&channel_id)
                .is_some_and(VecDeque::is_empty)
            {
                self.channel_queues.remove(&channel_id);
            }
            let engine = self.engine.clone();
            let handle = tokio::spawn(async move {
                let outcome = engine.handle_event(event).await;
                RunTaskResult {
                    channel_id,
                    outcome,
                }
            });
            self.active_runs
                .insert(channel_id, ActiveChannelRun { handle });
        }
    }

    async fn drain_finished_runs(&mut self) {
        let finished: Vec<ChannelId> = self
            .active_runs
            .iter()
            .filter_map(|(channel_id, run)| run.handle.is_finished().then_some(*channel_id))
            .collect();
        for channel_id in finished {
            let Some(run) = self.active_runs.remove(&channel_id) else {
                continue;
            };
            match run.handle.await {
                Ok(result) => log_outcome(&result),
                Err(join_error) => {
                    error!(%channel_id, %join_error, "channel worker task failed");
                }
            }
        }
    }

    async fn drain_on_shutdown(&mut self) {
        let queued = self.queued_events();
        if queued > 0 {
            warn!(queued, "discarding queued events at shutdown");
            self.channel_queues.clear();
        }
        let deadline = Instant::now() + self.shutdown_grace;
        while !self.active_runs.is_empty() && Instant::now() < deadline {
            self.drain_finished_runs().await;
            if self.active_runs.is_empty() {
                break;
            }
            sleep(Duration::from_millis(25)).await;
        }
        for (channel_id, run) in self.active_runs.drain() {
            run.handle.abort();
            warn!(%channel_id, "aborted in-flight channel worker at shutdown");
        }
    }
}

fn log_outcome(result: &RunTaskResult) {
    match &result.outcome {
        Ok(Dispatched::Nothing) => {
            debug!(channel_id = %result.channel_id, "event handled, no action");
        }
        Ok(outcome) => {
            info!(channel_id = %result.channel_id, ?outcome, "pin action completed");
        }
        Err(error) => {
            error!(channel_id = %result.channel_id, %error, "pin action failed");
        }
    }
}
