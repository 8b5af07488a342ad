//! Per-role notification toggles
//!
//! Missing or unreadable preferences mean "everything enabled". Changes are
//! published on a `watch` channel; `refresh` picks up writes made by another
//! process sharing the same store.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info};

use super::{load_json, save_json, KvStore, Namespace};
use crate::notification::{Category, Role};

/// Category toggles; absent categories are enabled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, bool>", into = "BTreeMap<String, bool>")]
pub struct PreferenceSet {
    toggles: BTreeMap<Category, bool>,
}

impl PreferenceSet {
    pub fn is_enabled(&self, category: Category) -> bool {
        self.toggles.get(&category).copied().unwrap_or(true)
    }

    pub fn set(&mut self, category: Category, enabled: bool) {
        self.toggles.insert(category, enabled);
    }

    /// Enabled categories of a role, in the role's table order
    pub fn enabled_for(&self, role: Role) -> Vec<Category> {
        role.categories()
            .iter()
            .copied()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }
}

impl From<BTreeMap<String, bool>> for PreferenceSet {
    fn from(raw: BTreeMap<String, bool>) -> Self {
        // Unknown names (renamed or retired categories) are dropped, not fatal
        let toggles = raw
            .into_iter()
            .filter_map(|(name, enabled)| name.parse::<Category>().ok().map(|c| (c, enabled)))
            .collect();
        Self { toggles }
    }
}

impl From<PreferenceSet> for BTreeMap<String, bool> {
    fn from(prefs: PreferenceSet) -> Self {
        prefs
            .toggles
            .into_iter()
            .map(|(c, enabled)| (c.as_str().to_string(), enabled))
            .collect()
    }
}

/// Preferences of one (user, role)
pub struct PreferenceStore {
    kv: Arc<dyn KvStore>,
    key: String,
    last: Mutex<PreferenceSet>,
    tx: watch::Sender<PreferenceSet>,
}

impl PreferenceStore {
    pub fn new(kv: Arc<dyn KvStore>, ns: &Namespace, role: Role) -> Self {
        let key = ns.prefs(role);
        let initial: PreferenceSet = load_json(kv.as_ref(), &key).unwrap_or_default();
        let (tx, _) = watch::channel(initial.clone());
        Self {
            kv,
            key,
            last: Mutex::new(initial),
            tx,
        }
    }

    /// Current preferences; never fails
    pub fn load(&self) -> PreferenceSet {
        load_json(self.kv.as_ref(), &self.key).unwrap_or_default()
    }

    /// Persist and publish
    pub fn save(&self, prefs: &PreferenceSet) -> Result<()> {
        save_json(self.kv.as_ref(), &self.key, prefs)?;
        self.observe(prefs.clone());
        info!(key = %self.key, "Notification preferences saved");
        Ok(())
    }

    /// Reload from the store and publish if it changed since last observed.
    /// Returns whether a change was seen.
    pub fn refresh(&self) -> bool {
        let current = self.load();
        let changed = self.observe(current);
        if changed {
            debug!(key = %self.key, "Preferences changed outside this process");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<PreferenceSet> {
        self.tx.subscribe()
    }

    fn observe(&self, prefs: PreferenceSet) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *last == prefs {
            return false;
        }
        *last = prefs.clone();
        self.tx.send_replace(prefs);
        true
    }
}
