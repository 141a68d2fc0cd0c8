//! Scheduler pacing and lifecycle

mod common;

use async_trait::async_trait;
use common::wait_for;
use sks_keys::{
    next_period_ms, AppendBuilder, KeyBuilder, KeyManager, KeyProvider, KeyRingManager,
    KeyResult, KeyScheduler, ManualClock, RandomKeyProvider, SecurityPolicy, TaskState, TruncateBuilder,
};
use sks_types::{EventType, KeysUpdatedPayload};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Update that outlasts any test
struct StalledBuilder;

#[async_trait]
impl KeyBuilder for StalledBuilder {
    async fn update(&self, _provider: &dyn KeyProvider, _manager: &dyn KeyManager) -> KeyResult<()> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

fn master_pipeline(generated: u32, max_keys: u32) -> (Arc<dyn KeyBuilder>, Arc<dyn KeyProvider>) {
    let builder: Arc<dyn KeyBuilder> =
        Arc::new(TruncateBuilder::new(Box::new(AppendBuilder::new()), max_keys).unwrap());
    let provider: Arc<dyn KeyProvider> =
        Arc::new(RandomKeyProvider::new(SecurityPolicy::PubSubAes256Ctr, generated).unwrap());
    (builder, provider)
}

#[test]
fn test_next_fire_follows_installed_lifetime() {
    let clock = Arc::new(ManualClock::new());
    let manager = Arc::new(KeyRingManager::with_clock("sgid_1", None, clock));
    manager.set_key_lifetime(10_000).unwrap();
    let (builder, provider) = master_pipeline(5, 20);

    let mut scheduler = KeyScheduler::new();
    scheduler.add_task(builder, provider, manager.clone(), 50).unwrap();
    let monitor = scheduler.monitor();
    scheduler.start().unwrap();

    assert!(wait_for(|| monitor.task_snapshots()[0].runs == 1));
    let snapshot = monitor.task_snapshots().remove(0);

    // Five tokens of 10 s each, current one untouched by the frozen clock
    let lifetime = manager.all_keys_lifetime();
    assert_eq!(lifetime, 50_000);
    assert_eq!(snapshot.period_ms, next_period_ms(lifetime));
    assert_eq!(snapshot.period_ms, 25_000);
    assert_ne!(snapshot.period_ms, 50);
    assert_eq!(snapshot.state, TaskState::Armed);

    scheduler.stop_and_clear();
}

#[test]
fn test_short_lifetime_is_clamped_to_two_seconds() {
    let clock = Arc::new(ManualClock::new());
    let manager = Arc::new(KeyRingManager::with_clock("sgid_1", None, clock));
    manager.set_key_lifetime(500).unwrap();
    let (builder, provider) = master_pipeline(2, 20);

    let mut scheduler = KeyScheduler::new();
    scheduler.add_task(builder, provider, manager, 20).unwrap();
    let monitor = scheduler.monitor();
    scheduler.start().unwrap();

    assert!(wait_for(|| monitor.task_snapshots()[0].runs == 1));
    assert_eq!(monitor.task_snapshots()[0].period_ms, 2000);
}

#[test]
fn test_update_publishes_event() {
    let manager = Arc::new(KeyRingManager::new("sgid_1", None));
    let (builder, provider) = master_pipeline(3, 20);

    let mut scheduler = KeyScheduler::new();
    let mut events = scheduler.subscribe();
    scheduler.add_task(builder, provider, manager, 20).unwrap();
    scheduler.start().unwrap();

    let event = events.blocking_recv().unwrap();
    assert_eq!(event.event_type, EventType::KeysUpdated);
    assert!(event.validate().is_ok());

    let payload: KeysUpdatedPayload = event.payload_as().unwrap();
    assert_eq!(payload.security_group_id, "sgid_1");
    assert_eq!(payload.key_count, 3);
}

#[test]
fn test_two_groups_share_one_pipeline() {
    let first = Arc::new(KeyRingManager::new("sgid_1", None));
    let second = Arc::new(KeyRingManager::new("sgid_2", None));
    let (builder, provider) = master_pipeline(5, 20);

    let mut scheduler = KeyScheduler::new();
    scheduler.add_task(builder.clone(), provider.clone(), first.clone(), 20).unwrap();
    scheduler.add_task(builder.clone(), provider.clone(), second.clone(), 40).unwrap();
    let monitor = scheduler.monitor();
    scheduler.start().unwrap();

    assert!(wait_for(|| first.size() == 5 && second.size() == 5));
    assert_ne!(
        first.get_keys(0, 1).unwrap().keys,
        second.get_keys(0, 1).unwrap().keys
    );

    scheduler.stop_and_clear();
    assert!(monitor
        .task_snapshots()
        .iter()
        .all(|task| task.state == TaskState::Cancelled));

    // Stopping releases the pipeline but keeps the keys
    assert_eq!(Arc::strong_count(&builder), 1);
    assert_eq!(Arc::strong_count(&provider), 1);
    assert_eq!(first.size(), 5);
}

#[test]
fn test_stop_prevents_further_updates() {
    let manager = Arc::new(KeyRingManager::new("sgid_1", None));
    let (builder, provider) = master_pipeline(1, 100);

    let mut scheduler = KeyScheduler::new();
    scheduler.add_task(builder, provider, manager.clone(), 20).unwrap();
    let monitor = scheduler.monitor();
    scheduler.start().unwrap();
    assert!(scheduler.start().is_err());

    assert!(wait_for(|| manager.size() >= 1));
    scheduler.stop_and_clear();
    scheduler.stop_and_clear();
    assert!(!scheduler.is_running());

    let size = manager.size();
    let runs = monitor.task_snapshots()[0].runs;
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(manager.size(), size);
    assert_eq!(monitor.task_snapshots()[0].runs, runs);
}

#[test]
fn test_stop_during_a_running_update() {
    let manager = Arc::new(KeyRingManager::new("sgid_1", None));
    let builder: Arc<dyn KeyBuilder> = Arc::new(StalledBuilder);
    let (_, provider) = master_pipeline(1, 20);

    let mut scheduler = KeyScheduler::new();
    scheduler.add_task(builder.clone(), provider, manager.clone(), 10).unwrap();
    let monitor = scheduler.monitor();
    scheduler.start().unwrap();
    assert!(wait_for(|| monitor.task_snapshots()[0].state == TaskState::Firing));

    let started = Instant::now();
    scheduler.stop_and_clear();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(!scheduler.is_running());
    assert_eq!(monitor.task_snapshots()[0].state, TaskState::Cancelled);
    assert_eq!(monitor.task_snapshots()[0].runs, 0);
    // The interrupted update released its builder
    assert_eq!(Arc::strong_count(&builder), 1);
    assert_eq!(manager.size(), 0);
}
