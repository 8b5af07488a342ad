//! Notification engine - one role, one user
//!
//! A cycle walks `Fetching → Diffing → Synthesizing → Committing` and returns to
//! `Idle`. Only one cycle runs at a time; a trigger that arrives mid-cycle is
//! coalesced. Seen-state and the feed are written as one `KvStore::set_many`
//! batch at the end of a cycle, so a cancelled or failed cycle leaves persisted
//! state untouched.

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::category::{Category, Role};
use super::diff::{self, CategoryDiff};
use super::feed::{assemble, DEFAULT_FEED_CAP};
use super::record::{notification_id, FeedItem, FeedView, NotificationRecord};
use super::synthesizer::synthesize;
use crate::source::{fetch_snapshots, LmsBackend, Resource};
use crate::store::{
    Cursor, FeedStore, KvStore, Namespace, PreferenceStore, ReadStore, SeenState, SeenStore,
};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a cycle is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PollPhase {
    Idle = 0,
    Fetching = 1,
    Diffing = 2,
    Synthesizing = 3,
    Committing = 4,
}

impl PollPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PollPhase::Fetching,
            2 => PollPhase::Diffing,
            3 => PollPhase::Synthesizing,
            4 => PollPhase::Committing,
            _ => PollPhase::Idle,
        }
    }
}

/// Why a cycle was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Start,
    Interval,
    PreferencesChanged,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Start => "start",
            Trigger::Interval => "interval",
            Trigger::PreferencesChanged => "preferences_changed",
            Trigger::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Summary of a committed cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub categories: Vec<Category>,
    pub events: usize,
    /// Records that were not in the feed before this cycle
    pub new_records: Vec<NotificationRecord>,
    /// Resources that failed; their categories were skipped
    pub failed: Vec<Resource>,
    pub unread: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was running; nothing was done
    Coalesced,
    /// Cancelled before commit; nothing was written
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub feed_cap: usize,
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed_cap: DEFAULT_FEED_CAP,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Resets the phase to `Idle` however the cycle ends
struct PhaseGuard<'a> {
    phase: &'a AtomicU8,
}

impl PhaseGuard<'_> {
    fn enter(&self, phase: PollPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.store(PollPhase::Idle as u8, Ordering::SeqCst);
    }
}

pub struct NotificationEngine {
    backend: Arc<dyn LmsBackend>,
    role: Role,
    kv: Arc<dyn KvStore>,
    ns: Namespace,
    seen: SeenStore,
    read: ReadStore,
    feed: FeedStore,
    prefs: Arc<PreferenceStore>,
    config: EngineConfig,
    phase: AtomicU8,
    /// Serializes read-modify-write of persisted state between cycles and user actions
    state_lock: Mutex<()>,
    feed_tx: watch::Sender<FeedView>,
}

impl NotificationEngine {
    pub fn new(
        backend: Arc<dyn LmsBackend>,
        kv: Arc<dyn KvStore>,
        user: &str,
        role: Role,
        config: EngineConfig,
    ) -> Self {
        let ns = Namespace::new(user);
        let seen = SeenStore::new(kv.clone(), ns.clone());
        let read = ReadStore::new(kv.clone(), ns.clone());
        let feed = FeedStore::new(kv.clone(), ns.clone());
        let prefs = Arc::new(PreferenceStore::new(kv.clone(), &ns, role));
        let (feed_tx, _) = watch::channel(view_of(feed.get(), &read.get()));

        Self {
            backend,
            role,
            kv,
            ns,
            seen,
            read,
            feed,
            prefs,
            config,
            phase: AtomicU8::new(PollPhase::Idle as u8),
            state_lock: Mutex::new(()),
            feed_tx,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn user(&self) -> &str {
        self.ns.user()
    }

    pub fn phase(&self) -> PollPhase {
        PollPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.prefs
    }

    /// Feed view after every committed cycle or user action
    pub fn subscribe_feed(&self) -> watch::Receiver<FeedView> {
        self.feed_tx.subscribe()
    }

    /// Run one poll cycle. Coalesced if a cycle is already running.
    pub async fn run_cycle(&self, trigger: Trigger, cancel: &CancellationToken) -> Result<CycleOutcome> {
        if self
            .phase
            .compare_exchange(
                PollPhase::Idle as u8,
                PollPhase::Fetching as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!(trigger = %trigger, phase = ?self.phase(), "Cycle already running, coalescing");
            return Ok(CycleOutcome::Coalesced);
        }
        let guard = PhaseGuard { phase: &self.phase };
        debug!(user = %self.user(), role = %self.role, trigger = %trigger, "Poll cycle started");

        if cancel.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        let categories = self.prefs.load().enabled_for(self.role);
        let resources: BTreeSet<Resource> = categories.iter().map(|c| c.resource()).collect();

        let snapshots = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(trigger = %trigger, "Poll cycle cancelled while fetching");
                return Ok(CycleOutcome::Cancelled);
            }
            set = fetch_snapshots(
                self.backend.as_ref(),
                self.role,
                &resources,
                self.config.fetch_timeout,
            ) => set,
        };

        // Held until commit: user actions and `reset` wait instead of being
        // overwritten by this cycle's stale copy of seen-state.
        let lock = self.lock_state();

        guard.enter(PollPhase::Diffing);
        if cancel.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }
        let diffs: Vec<CategoryDiff> = categories
            .iter()
            .filter_map(|&category| {
                let diff = diff::diff_category(category, &snapshots, &self.seen);
                if diff.is_none() {
                    debug!(category = %category, "Resource unavailable, category skipped");
                }
                diff
            })
            .collect();

        guard.enter(PollPhase::Synthesizing);
        if cancel.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }
        let events: Vec<_> = diffs.iter().flat_map(|d| d.events.iter().cloned()).collect();
        let records = synthesize(self.role, &events, Utc::now());

        guard.enter(PollPhase::Committing);
        if cancel.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }
        let existing = self.feed.get();
        let feed = assemble(&existing, &records, self.config.feed_cap);
        let known: BTreeSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
        let new_records: Vec<NotificationRecord> = feed
            .iter()
            .filter(|r| !known.contains(r.id.as_str()))
            .cloned()
            .collect();

        // Feed first: if the store applies only a prefix of the batch, the
        // next cycle repeats its events instead of losing them.
        let mut batch = Vec::new();
        if feed != existing {
            batch.push(self.feed.entry(&feed)?);
        }
        for diff in &diffs {
            for (slot, state) in &diff.staged {
                batch.push(self.seen.entry(slot, state)?);
            }
        }
        if !batch.is_empty() {
            self.kv.set_many(&batch)?;
        }

        let view = view_of(feed, &self.read.get());
        let unread = view.unread;
        self.feed_tx.send_replace(view);
        drop(lock);
        drop(guard);

        let report = CycleReport {
            categories,
            events: events.len(),
            new_records,
            failed: snapshots.failures.keys().copied().collect(),
            unread,
        };
        if report.new_records.is_empty() {
            debug!(trigger = %trigger, events = report.events, "Poll cycle committed, nothing new");
        } else {
            info!(
                user = %self.user(),
                trigger = %trigger,
                new = report.new_records.len(),
                unread = report.unread,
                "New notifications"
            );
        }
        Ok(CycleOutcome::Completed(report))
    }

    // ==================== user actions ====================

    /// Mark notifications read. Returns how many were not read before.
    pub fn mark_read<I, S>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _lock = self.lock_state();
        let mut read = self.read.get();
        let before = read.len();
        read.extend(ids.into_iter().map(Into::into));
        let added = read.len() - before;
        if added > 0 {
            self.read.set(&read)?;
            self.publish(&read);
        }
        Ok(added)
    }

    /// Mark every notification currently in the feed read
    pub fn mark_all_read(&self) -> Result<usize> {
        let ids: Vec<String> = self.feed.get().into_iter().map(|r| r.id).collect();
        self.mark_read(ids)
    }

    /// The user opened a material: advance its acknowledged signature and mark
    /// the matching update notification read.
    pub fn acknowledge_material(&self, material_id: &str, signature: &str) -> Result<()> {
        let slot = diff::slot(Category::MaterialUpdate);
        {
            let _lock = self.lock_state();
            let mut acked = self.seen.cursors(&slot).unwrap_or_default();
            acked.insert(
                material_id.to_string(),
                Cursor::Signature(signature.to_string()),
            );
            self.seen.set(&slot, &SeenState::cursors(acked))?;
        }
        info!(material = %material_id, signature = %signature, "Material acknowledged");
        self.mark_read([notification_id(
            Category::MaterialUpdate,
            material_id,
            signature,
        )])?;
        Ok(())
    }

    /// Toggle one category for this role; subscribers see the change
    pub fn set_preference(&self, category: Category, enabled: bool) -> Result<()> {
        if !self.role.categories().contains(&category) {
            return Err(anyhow!(
                "category {} is not available for role {}",
                category,
                self.role
            ));
        }
        let mut prefs = self.prefs.load();
        prefs.set(category, enabled);
        self.prefs.save(&prefs)
    }

    /// Category toggles for this role, in display order
    pub fn preference_list(&self) -> Vec<(Category, bool)> {
        let prefs = self.prefs.load();
        self.role
            .categories()
            .iter()
            .map(|&c| (c, prefs.is_enabled(c)))
            .collect()
    }

    /// Forget seen, read and feed state for this user. Preferences are kept.
    pub fn reset(&self) -> Result<usize> {
        let _lock = self.lock_state();
        let mut keys = self.kv.keys_with_prefix(&format!("{}seen/", self.ns.prefix()))?;
        keys.push(self.ns.read());
        keys.push(self.ns.feed());
        for key in &keys {
            self.kv.delete(key)?;
        }
        warn!(user = %self.user(), keys = keys.len(), "Notification state reset");
        self.feed_tx.send_replace(FeedView::default());
        Ok(keys.len())
    }

    pub fn feed_view(&self) -> FeedView {
        view_of(self.feed.get(), &self.read.get())
    }

    /// Signatures currently acknowledged, by material id
    pub fn acknowledged_materials(&self) -> BTreeMap<String, String> {
        self.seen
            .cursors(&diff::slot(Category::MaterialUpdate))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(id, c)| c.signature().map(|s| (id, s.to_string())))
            .collect()
    }

    fn publish(&self, read: &BTreeSet<String>) {
        self.feed_tx.send_replace(view_of(self.feed.get(), read));
    }

    fn lock_state(&self) -> MutexGuard<'_, ()> {
        match self.state_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn view_of(feed: Vec<NotificationRecord>, read: &BTreeSet<String>) -> FeedView {
    let items: Vec<FeedItem> = feed
        .into_iter()
        .map(|record| {
            let read = read.contains(&record.id);
            FeedItem { record, read }
        })
        .collect();
    let unread = items.iter().filter(|i| !i.read).count();
    FeedView { items, unread }
}
