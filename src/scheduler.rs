//! Poll scheduler - drives engine cycles from timers and preference changes
//!
//! Each trigger spawns a cycle task; the engine's single-flight guard coalesces
//! triggers that arrive while a cycle is running. A coalesced preference change
//! still gets one more cycle once the running one ends, since that cycle fetched
//! with the old toggles. Cancelling the token stops the loop and abandons an
//! in-flight cycle before it commits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::DEFAULT_PREFS_REFRESH_SECS;
use crate::notification::{CycleOutcome, NotificationEngine, PollPhase, Trigger};

pub struct PollScheduler {
    engine: Arc<NotificationEngine>,
    interval: Duration,
    prefs_refresh: Duration,
    cancel: CancellationToken,
    manual_tx: mpsc::UnboundedSender<Trigger>,
    manual_rx: mpsc::UnboundedReceiver<Trigger>,
    /// Set when a preference change was coalesced into a running cycle
    rerun: Arc<AtomicBool>,
}

/// Handle for requesting cycles from outside the loop
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Trigger>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    /// Request a cycle now; coalesced if one is running
    pub fn poll_now(&self) {
        let _ = self.tx.send(Trigger::Manual);
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl PollScheduler {
    pub fn new(engine: Arc<NotificationEngine>, interval: Duration) -> Self {
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            interval,
            prefs_refresh: Duration::from_secs(DEFAULT_PREFS_REFRESH_SECS),
            cancel: CancellationToken::new(),
            manual_tx,
            manual_rx,
            rerun: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_prefs_refresh(mut self, every: Duration) -> Self {
        self.prefs_refresh = every;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            tx: self.manual_tx.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Run on a background task
    pub fn spawn(self) -> (SchedulerHandle, JoinHandle<()>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Loop until cancelled. The first cycle fires immediately.
    pub async fn run(mut self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut refresher = interval(self.prefs_refresh);
        refresher.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut prefs_rx = self.engine.preferences().subscribe();
        let mut first = true;

        info!(
            user = %self.engine.user(),
            role = %self.engine.role(),
            interval_secs = self.interval.as_secs(),
            "Notification polling started"
        );

        loop {
            let trigger = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                changed = prefs_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    Trigger::PreferencesChanged
                }
                Some(trigger) = self.manual_rx.recv() => trigger,
                _ = ticker.tick() => {
                    if std::mem::take(&mut first) { Trigger::Start } else { Trigger::Interval }
                }
                _ = refresher.tick() => {
                    // publishes on `prefs_rx` when another process changed them
                    self.engine.preferences().refresh();
                    continue;
                }
            };
            self.dispatch(trigger);
        }

        info!(user = %self.engine.user(), "Notification polling stopped");
    }

    fn dispatch(&self, trigger: Trigger) {
        let engine = self.engine.clone();
        let cancel = self.cancel.clone();
        let rerun = self.rerun.clone();
        tokio::spawn(drive(engine, cancel, rerun, trigger));
    }
}

/// Run one cycle, then keep going while a coalesced preference change is owed
async fn drive(
    engine: Arc<NotificationEngine>,
    cancel: CancellationToken,
    rerun: Arc<AtomicBool>,
    mut trigger: Trigger,
) {
    loop {
        match engine.run_cycle(trigger, &cancel).await {
            Ok(CycleOutcome::Completed(report)) => {
                if !report.failed.is_empty() {
                    debug!(trigger = %trigger, failed = ?report.failed, "Cycle finished with skipped resources");
                }
            }
            Ok(CycleOutcome::Coalesced) => {
                debug!(trigger = %trigger, "Trigger coalesced into running cycle");
                if trigger != Trigger::PreferencesChanged {
                    return;
                }
                rerun.store(true, Ordering::SeqCst);
                // the running cycle picks the flag up when it ends
                if engine.phase() != PollPhase::Idle {
                    return;
                }
            }
            Ok(CycleOutcome::Cancelled) => {
                debug!(trigger = %trigger, "Cycle cancelled");
                return;
            }
            Err(e) => {
                error!(trigger = %trigger, error = %e, "Poll cycle failed");
            }
        }

        if cancel.is_cancelled() || !rerun.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!("Re-running for preferences changed during the last cycle");
        trigger = Trigger::PreferencesChanged;
    }
}
