//! Single-flight, cancellation and trigger handling

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lms_notify::notification::{
    Category, CycleOutcome, EngineConfig, FeedView, PollPhase, Role, Trigger,
};
use lms_notify::source::{ClassMembership, Material, ProfileRequest, RequestStatus};
use lms_notify::{FetchError, KvStore, LmsBackend, MemoryStore, NotificationEngine, PollScheduler};
use tokio::sync::{watch, Notify, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Backend whose membership listing blocks until released; every call uses up
/// one permit
struct GatedBackend {
    started: Notify,
    release: Semaphore,
    calls: AtomicUsize,
}

impl GatedBackend {
    fn new() -> Self {
        Self {
            started: Notify::new(),
            release: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    fn open(&self) {
        self.release.add_permits(1000);
    }
}

#[async_trait]
impl LmsBackend for GatedBackend {
    async fn profile_requests(
        &self,
        _status: Option<&RequestStatus>,
    ) -> Result<Vec<ProfileRequest>, FetchError> {
        Ok(Vec::new())
    }

    async fn memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.release
            .acquire()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .forget();
        Ok(vec![ClassMembership {
            class_id: "c1".to_string(),
            class_name: "Kelas A".to_string(),
            teacher_name: None,
            student_id: None,
            student_name: None,
        }])
    }

    async fn pending_memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
        Ok(Vec::new())
    }

    async fn materials(&self, class_id: &str) -> Result<Vec<Material>, FetchError> {
        Ok(vec![Material {
            id: "m1".to_string(),
            class_id: class_id.to_string(),
            title: "Aljabar".to_string(),
            updated_at: "t1".to_string(),
            questions: Vec::new(),
        }])
    }
}

fn engine(backend: Arc<GatedBackend>, kv: Arc<MemoryStore>) -> Arc<NotificationEngine> {
    Arc::new(NotificationEngine::new(
        backend,
        kv,
        "user-1",
        Role::Student,
        EngineConfig::default(),
    ))
}

async fn next_publish(rx: &mut watch::Receiver<FeedView>) {
    timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("no feed published in time")
        .unwrap();
}

async fn wait_idle(engine: &NotificationEngine) {
    for _ in 0..100 {
        if engine.phase() == PollPhase::Idle {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("engine did not return to idle");
}

// ==================== single-flight ====================

#[tokio::test]
async fn test_trigger_during_cycle_is_coalesced() {
    // Given: a cycle blocked inside its fetch
    let backend = Arc::new(GatedBackend::new());
    let engine = engine(backend.clone(), Arc::new(MemoryStore::new()));
    let cancel = CancellationToken::new();
    let running = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run_cycle(Trigger::Start, &cancel).await })
    };
    backend.started.notified().await;
    assert_eq!(engine.phase(), PollPhase::Fetching);

    // When: another trigger arrives
    let second = engine.run_cycle(Trigger::Interval, &cancel).await.unwrap();

    // Then: it is coalesced without fetching
    assert_eq!(second, CycleOutcome::Coalesced);

    // And: the first cycle completes once the backend answers
    backend.open();
    let first = running.await.unwrap().unwrap();
    assert!(matches!(first, CycleOutcome::Completed(_)));
    assert_eq!(engine.phase(), PollPhase::Idle);

    // And: the next trigger runs normally
    let third = engine.run_cycle(Trigger::Manual, &cancel).await.unwrap();
    assert!(matches!(third, CycleOutcome::Completed(_)));
}

// ==================== cancellation ====================

#[tokio::test]
async fn test_cancel_during_fetch_commits_nothing() {
    // Given: a cycle blocked inside its fetch
    let backend = Arc::new(GatedBackend::new());
    let kv = Arc::new(MemoryStore::new());
    let engine = engine(backend.clone(), kv.clone());
    let cancel = CancellationToken::new();
    let running = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run_cycle(Trigger::Start, &cancel).await })
    };
    backend.started.notified().await;

    // When: the token is cancelled
    cancel.cancel();
    let outcome = running.await.unwrap().unwrap();

    // Then: the cycle reports cancellation and nothing was persisted
    assert_eq!(outcome, CycleOutcome::Cancelled);
    assert!(kv.is_empty());
    assert_eq!(engine.phase(), PollPhase::Idle);
}

// ==================== scheduler triggers ====================

#[tokio::test]
async fn test_scheduler_runs_on_start_and_manual_trigger() {
    // Given: a scheduler with a long interval
    let backend = Arc::new(GatedBackend::new());
    backend.open();
    let engine = engine(backend.clone(), Arc::new(MemoryStore::new()));
    let mut feed_rx = engine.subscribe_feed();
    let (handle, task) = PollScheduler::new(engine.clone(), Duration::from_secs(3600)).spawn();

    // When: it starts
    next_publish(&mut feed_rx).await;
    wait_idle(&engine).await;
    let after_start = backend.calls.load(Ordering::SeqCst);
    assert!(after_start > 0);

    // And: a manual poll is requested
    handle.poll_now();
    next_publish(&mut feed_rx).await;

    // Then: the backend was read again
    assert!(backend.calls.load(Ordering::SeqCst) > after_start);

    handle.cancel();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_preference_change_triggers_cycle() {
    // Given: a running scheduler that finished its first cycle
    let backend = Arc::new(GatedBackend::new());
    backend.open();
    let engine = engine(backend.clone(), Arc::new(MemoryStore::new()));
    let mut feed_rx = engine.subscribe_feed();
    let (handle, task) = PollScheduler::new(engine.clone(), Duration::from_secs(3600)).spawn();
    next_publish(&mut feed_rx).await;
    wait_idle(&engine).await;

    // When: a category is disabled in this process
    engine.set_preference(Category::NewQuestions, false).unwrap();

    // Then: a new cycle runs without waiting for the interval
    next_publish(&mut feed_rx).await;

    handle.cancel();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_preference_change_from_another_process_triggers_cycle() {
    // Given: a scheduler that re-reads preferences quickly
    let backend = Arc::new(GatedBackend::new());
    backend.open();
    let kv = Arc::new(MemoryStore::new());
    let engine = engine(backend.clone(), kv.clone());
    let mut feed_rx = engine.subscribe_feed();
    let (handle, task) = PollScheduler::new(engine.clone(), Duration::from_secs(3600))
        .with_prefs_refresh(Duration::from_millis(20))
        .spawn();
    next_publish(&mut feed_rx).await;
    wait_idle(&engine).await;

    // When: another process writes preferences straight to the store
    kv.set("user-1/prefs/student", r#"{"ai_grading":false}"#)
        .unwrap();

    // Then: the change is noticed and a cycle runs
    next_publish(&mut feed_rx).await;
    assert!(!engine.preferences().load().is_enabled(Category::AiGrading));

    handle.cancel();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_preference_change_during_cycle_runs_again_afterwards() {
    // Given: a scheduler whose first cycle is stuck in a fetch
    let backend = Arc::new(GatedBackend::new());
    let engine = engine(backend.clone(), Arc::new(MemoryStore::new()));
    let (handle, task) = PollScheduler::new(engine.clone(), Duration::from_secs(3600)).spawn();
    backend.started.notified().await;

    // When: preferences change while that cycle still uses the old ones
    engine.set_preference(Category::AiGrading, false).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let during = backend.calls.load(Ordering::SeqCst);
    backend.open();

    // Then: one more cycle runs without waiting for the interval
    timeout(Duration::from_secs(5), async {
        while backend.calls.load(Ordering::SeqCst) <= during {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no follow-up cycle after the preference change");
    wait_idle(&engine).await;

    handle.cancel();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_acknowledgement_during_fetch_survives_commit() {
    // Given: a material acknowledged at t1, and a cycle stuck in its fetch
    let backend = Arc::new(GatedBackend::new());
    let kv = Arc::new(MemoryStore::new());
    let engine = engine(backend.clone(), kv.clone());
    let cancel = CancellationToken::new();
    let running = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run_cycle(Trigger::Start, &cancel).await })
    };
    backend.started.notified().await;

    // When: the user opens the material mid-cycle and the fetch then finishes
    engine.acknowledge_material("m1", "t1").unwrap();
    backend.open();
    let outcome = running.await.unwrap().unwrap();

    // Then: the acknowledgement is kept and nothing is announced
    let CycleOutcome::Completed(report) = outcome else {
        panic!("expected a completed cycle");
    };
    assert!(report.new_records.is_empty());
    assert_eq!(
        engine.acknowledged_materials().get("m1").map(String::as_str),
        Some("t1")
    );
}

#[tokio::test]
async fn test_reset_during_fetch_is_not_undone_by_commit() {
    // Given: a recorded baseline and a second cycle stuck in its fetch
    let backend = Arc::new(GatedBackend::new());
    let kv = Arc::new(MemoryStore::new());
    let engine = engine(backend.clone(), kv.clone());
    let cancel = CancellationToken::new();
    // both membership listings of the first cycle
    backend.release.add_permits(2);
    engine.run_cycle(Trigger::Start, &cancel).await.unwrap();
    backend.started.notified().await;
    engine.mark_read(["material_update:m1:t1"]).unwrap();
    let running = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run_cycle(Trigger::Interval, &cancel).await })
    };
    backend.started.notified().await;

    // When: the user resets and the fetch then finishes
    engine.reset().unwrap();
    backend.open();
    running.await.unwrap().unwrap();

    // Then: the cycle diffed against the cleared state, so it was a cold start
    // and the cleared read state stays gone
    assert!(kv.get("user-1/read").unwrap().is_none());
    assert!(engine.feed_view().items.is_empty());
    assert!(kv.get("user-1/seen/material_update").unwrap().is_some());
}

#[tokio::test]
async fn test_cancelled_scheduler_stops() {
    // Given: a scheduler whose first cycle is stuck in a fetch
    let backend = Arc::new(GatedBackend::new());
    let kv = Arc::new(MemoryStore::new());
    let engine = engine(backend.clone(), kv.clone());
    let (handle, task) = PollScheduler::new(engine.clone(), Duration::from_secs(3600)).spawn();
    backend.started.notified().await;

    // When: cancelling
    handle.cancel();

    // Then: the loop exits, the stuck cycle is abandoned and nothing is stored
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    wait_idle(&engine).await;
    assert!(handle.is_cancelled());
    assert!(kv.is_empty());
}
