use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tack_core::{
    ChannelId, EngineConfig, GatewayEvent, GuildId, MessageId, MessageRef, ReactionEvent, UserId,
};
use tack_engine::{CapabilityError, Dispatched, PinCapability, PinEngine};
use tack_store::{PinStore, SqlitePinStore};
use tokio::sync::Mutex as AsyncMutex;

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Platform double whose pin/unpin outcomes are scripted per call. An empty
/// queue means success, so only failures need to be queued up front.
struct ScriptedPlatform {
    pin_outcomes: AsyncMutex<VecDeque<Result<(), CapabilityError>>>,
    unpin_outcomes: AsyncMutex<VecDeque<Result<(), CapabilityError>>>,
    live_pins: AsyncMutex<Vec<MessageId>>,
    pin_calls: AsyncMutex<Vec<(ChannelId, MessageId)>>,
    unpin_calls: AsyncMutex<Vec<(ChannelId, MessageId)>>,
    notices: AsyncMutex<Vec<(ChannelId, String)>>,
}

impl ScriptedPlatform {
    fn new() -> Self {
        Self {
            pin_outcomes: AsyncMutex::new(VecDeque::new()),
            unpin_outcomes: AsyncMutex::new(VecDeque::new()),
            live_pins: AsyncMutex::new(Vec::new()),
            pin_calls: AsyncMutex::new(Vec::new()),
            unpin_calls: AsyncMutex::new(Vec::new()),
            notices: AsyncMutex::new(Vec::new()),
        }
    }

    async fn queue_pin_outcome(&self, outcome: Result<(), CapabilityError>) {
        self.pin_outcomes.lock().await.push_back(outcome);
    }

    async fn queue_unpin_outcome(&self, outcome: Result<(), CapabilityError>) {
        self.unpin_outcomes.lock().await.push_back(outcome);
    }

    async fn pin_call_count(&self) -> usize {
        self.pin_calls.lock().await.len()
    }

    async fn unpin_call_count(&self) -> usize {
        self.unpin_calls.lock().await.len()
    }

    async fn notices(&self) -> Vec<(ChannelId, String)> {
        self.notices.lock().await.clone()
    }
}

#[async_trait]
impl PinCapability for ScriptedPlatform {
    async fn pin(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), CapabilityError> {
        self.pin_calls.lock().await.push((channel_id, message_id));
        self.pin_outcomes.lock().await.pop_front().unwrap_or(Ok(()))
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

struct IsolatedWorkspace {
    root: PathBuf,
}

impl IsolatedWorkspace {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "tack-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create isolated workspace root");
        Self { root }
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn db_path(&self) -> PathBuf {
        self.root().join("pins.sqlite3")
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn open_store(path: &Path) -> Arc<dyn PinStore> {
    Arc::new(SqlitePinStore::new(path).expect("sqlite store should open"))
}

fn engine_with(
    store: Arc<dyn PinStore>,
    platform: Arc<ScriptedPlatform>,
    config: EngineConfig,
) -> PinEngine {
    PinEngine::new(store, platform, config)
}

fn two_vote_config() -> EngineConfig {
    EngineConfig {
        threshold: 2,
        ..EngineConfig::default()
    }
}

fn message(channel: u64, message: u64) -> MessageRef {
    MessageRef::new(GuildId(7), ChannelId(channel), MessageId(message))
}

fn reaction(message: MessageRef, user: u64, added: bool) -> GatewayEvent {
    GatewayEvent::Reaction(ReactionEvent {
        message,
        user_id: UserId(user),
        added,
    })
}

#[tokio::test]
async fn reaction_threshold_pins_and_announces() {
    let workspace = IsolatedWorkspace::new("threshold-pin");
    let store = open_store(&workspace.db_path());
    let platform = Arc::new(ScriptedPlatform::new());
    let engine = engine_with(store.clone(), platform.clone(), two_vote_config());
    let target = message(80, 800);

    let first = engine
        .handle_event(reaction(target, 1, true))
        .await
        .expect("first reaction should be absorbed");
    assert_eq!(first, Dispatched::Nothing);

    let second = engine
        .handle_event(reaction(target, 2, true))
        .await
        .expect("second reaction should pin");
    assert_eq!(second, Dispatched::Pinned(target));

    assert_eq!(platform.pin_call_count().await, 1);
    let record = store
        .get(&target)
        .await
        .expect("store read should succeed")
        .expect("target should be tracked");
    assert!(record.pinned);
    assert_eq!(record.reactor_count(), 2);

    let pins = store
        .list_pinned(target.channel_id)
        .await
        .expect("pin list should load");
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].message_id, target.message_id);
    assert!(pins[0].tracked);

    let notices = platform.notices().await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, target.channel_id);
    assert!(notices[0].1.contains("2 reactions"));
    assert!(notices[0].1.contains(&target.jump_link()));
}

#[tokio::test]
async fn falling_below_threshold_unpins() {
    let workspace = IsolatedWorkspace::new("fallback-unpin");
    let store = open_store(&workspace.db_path());
    let platform = Arc::new(ScriptedPlatform::new());
    let engine = engine_with(store.clone(), platform.clone(), two_vote_config());
    let target = message(81, 810);

    engine
        .handle_event(reaction(target, 1, true))
        .await
        .expect("first reaction");
    engine
        .handle_event(reaction(target, 2, true))
        .await
        .expect("pinning reaction");

    let outcome = engine
        .handle_event(reaction(target, 2, false))
        .await
        .expect("removal should unpin");
    assert_eq!(outcome, Dispatched::Unpinned(target));
    assert_eq!(platform.unpin_call_count().await, 1);

    let record = store
        .get(&target)
        .await
        .expect("store read should succeed")
        .expect("target should stay tracked");
    assert!(!record.pinned);
    assert!(record.pinned_at.is_some(), "pin history must survive unpin");
    let pins = store
        .list_pinned(target.channel_id)
        .await
        .expect("pin list should load");
    assert!(pins.is_empty());
}

#[tokio::test]
async fn restart_resume_completes_interrupted_pin() {
    let workspace = IsolatedWorkspace::new("resume-pin");
    let target = message(82, 820);

    {
        let store = open_store(&workspace.db_path());
        let broken = Arc::new(ScriptedPlatform::new());
        broken
            .queue_pin_outcome(Err(CapabilityError::Permanent {
                reason: "missing permissions".to_string(),
            }))
            .await;
        let engine = engine_with(store, broken.clone(), two_vote_config());

        engine
            .handle_event(reaction(target, 1, true))
            .await
            .expect("first reaction");
        let failed = engine.handle_event(reaction(target, 2, true)).await;
        assert!(failed.is_err(), "platform rejection must surface");
        assert_eq!(broken.pin_call_count().await, 1);
    }

    let store = open_store(&workspace.db_path());
    let platform = Arc::new(ScriptedPlatform::new());
    let engine = engine_with(store.clone(), platform.clone(), two_vote_config());
    engine.resume().await.expect("resume sweep should succeed");

    assert_eq!(platform.pin_call_count().await, 1);
    let record = store
        .get(&target)
        .await
        .expect("store read should succeed")
        .expect("target should be tracked");
    assert!(record.pinned, "resume must finish the interrupted pin");
    let pins = store
        .list_pinned(target.channel_id)
        .await
        .expect("pin list should load");
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].message_id, target.message_id);
}

#[tokio::test]
async fn failed_eviction_restores_the_oldest_pin() {
    let workspace = IsolatedWorkspace::new("eviction-rollback");
    let store = open_store(&workspace.db_path());
    let platform = Arc::new(ScriptedPlatform::new());
    let config = EngineConfig {
        threshold: 2,
        capacity: 1,
        ..EngineConfig::default()
    };
    let engine = engine_with(store.clone(), platform.clone(), config);
    let victim = message(83, 830);
    let target = message(83, 831);

    engine
        .handle_event(reaction(victim, 1, true))
        .await
        .expect("first reaction on victim");
    engine
        .handle_event(reaction(victim, 2, true))
        .await
        .expect("victim should pin");
    let before = store
        .list_pinned(victim.channel_id)
        .await
        .expect("pin list should load");
    assert_eq!(before.len(), 1);
    let original_pinned_at = before[0].pinned_at;

    platform
        .queue_unpin_outcome(Err(CapabilityError::Permanent {
            reason: "missing permissions".to_string(),
        }))
        .await;
    engine
        .handle_event(reaction(target, 1, true))
        .await
        .expect("first reaction on target");
    let failed = engine.handle_event(reaction(target, 2, true)).await;
    assert!(failed.is_err(), "failed eviction must surface");

    assert_eq!(platform.unpin_call_count().await, 1);
    assert_eq!(platform.pin_call_count().await, 1, "no pin after failed unpin");

    let after = store
        .list_pinned(victim.channel_id)
        .await
        .expect("pin list should load");
    assert_eq!(after.len(), 1, "victim must be restored");
    assert_eq!(after[0].message_id, victim.message_id);
    assert_eq!(after[0].pinned_at, original_pinned_at);
    let target_record = store
        .get(&target)
        .await
        .expect("store read should succeed")
        .expect("target should stay tracked");
    assert!(!target_record.pinned);
}

#[tokio::test]
async fn redelivered_reactions_stay_idempotent_across_restart() {
    let workspace = IsolatedWorkspace::new("redelivery");
    let target = message(84, 840);

    {
        let store = open_store(&workspace.db_path());
        let platform = Arc::new(ScriptedPlatform::new());
        let engine = engine_with(store, platform.clone(), two_vote_config());
        engine
            .handle_event(reaction(target, 1, true))
            .await
            .expect("initial delivery");
        assert_eq!(platform.pin_call_count().await, 0);
    }

    let store = open_store(&workspace.db_path());
    let platform = Arc::new(ScriptedPlatform::new());
    let engine = engine_with(store.clone(), platform.clone(), two_vote_config());

    let redelivered = engine
        .handle_event(reaction(target, 1, true))
        .await
        .expect("redelivery after restart");
    assert_eq!(redelivered, Dispatched::Nothing);
    let record = store
        .get(&target)
        .await
        .expect("store read should succeed")
        .expect("target should be tracked");
    assert_eq!(record.reactor_count(), 1, "same reactor counted once");

    let pinned = engine
        .handle_event(reaction(target, 2, true))
        .await
        .expect("fresh reactor should pin");
    assert_eq!(pinned, Dispatched::Pinned(target));
    assert_eq!(platform.pin_call_count().await, 1);
}

#[tokio::test]
async fn adopted_manual_pins_survive_restart_untracked() {
    let workspace = IsolatedWorkspace::new("manual-adoption");
    let target = message(85, 850);
    let manual = MessageId(859);

    {
        let store = open_store(&workspace.db_path());
        let platform = Arc::new(ScriptedPlatform::new());
        platform.live_pins.lock().await.push(manual);
        let engine = engine_with(store, platform.clone(), two_vote_config());
        engine
            .handle_event(reaction(target, 1, true))
            .await
            .expect("first reaction");
        engine
            .handle_event(reaction(target, 2, true))
            .await
            .expect("pinning reaction");
    }

    let store = open_store(&workspace.db_path());
    let pins = store
        .list_pinned(target.channel_id)
        .await
        .expect("pin list should load");
    assert_eq!(pins.len(), 2);
    let adopted = pins
        .iter()
        .find(|entry| entry.message_id == manual)
        .expect("manual pin should have been adopted");
    assert!(!adopted.tracked, "manual pins are never eviction candidates");
    let ours = pins
        .iter()
        .find(|entry| entry.message_id == target.message_id)
        .expect("auto pin should be stored");
    assert!(ours.tracked);
}
