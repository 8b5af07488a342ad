//! Seen-state: what has already been synthesized into a notification
//!
//! Two shapes: a cursor map (`entity id -> count | signature`) for "has this
//! grown/changed", and an id set for "notify at most once, ever". Keys are only
//! ever added or updated; removal happens through an explicit user reset.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::warn;

use super::{json_entry, load_json, save_json, KvStore, Namespace};

/// Scalar watermark for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    Count(u64),
    Signature(String),
}

impl Cursor {
    pub fn count(&self) -> Option<u64> {
        match self {
            Cursor::Count(n) => Some(*n),
            Cursor::Signature(_) => None,
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match self {
            Cursor::Signature(s) => Some(s),
            Cursor::Count(_) => None,
        }
    }
}

/// Persisted state of one diff slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum SeenState {
    Cursor { cursors: BTreeMap<String, Cursor> },
    Set { ids: BTreeSet<String> },
}

impl SeenState {
    pub fn cursors(cursors: BTreeMap<String, Cursor>) -> Self {
        SeenState::Cursor { cursors }
    }

    pub fn set(ids: BTreeSet<String>) -> Self {
        SeenState::Set { ids }
    }

    pub fn len(&self) -> usize {
        match self {
            SeenState::Cursor { cursors } => cursors.len(),
            SeenState::Set { ids } => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Seen-state of one user
#[derive(Clone)]
pub struct SeenStore {
    kv: Arc<dyn KvStore>,
    ns: Namespace,
}

impl SeenStore {
    pub fn new(kv: Arc<dyn KvStore>, ns: Namespace) -> Self {
        Self { kv, ns }
    }

    /// `None` when the slot was never recorded (or is unreadable)
    pub fn get(&self, slot: &str) -> Option<SeenState> {
        load_json(self.kv.as_ref(), &self.ns.seen(slot))
    }

    /// Full replace of one slot
    pub fn set(&self, slot: &str, state: &SeenState) -> Result<()> {
        save_json(self.kv.as_ref(), &self.ns.seen(slot), state)
    }

    /// Pending write of one slot, for a batched commit
    pub fn entry(&self, slot: &str, state: &SeenState) -> Result<(String, String)> {
        json_entry(self.ns.seen(slot), state)
    }

    /// Cursor map of a slot; a slot holding the other shape reads as unrecorded
    pub fn cursors(&self, slot: &str) -> Option<BTreeMap<String, Cursor>> {
        match self.get(slot)? {
            SeenState::Cursor { cursors } => Some(cursors),
            SeenState::Set { .. } => {
                warn!(slot = %slot, "Expected cursor form, found set form; treating as empty");
                None
            }
        }
    }

    /// Id set of a slot; a slot holding the other shape reads as unrecorded
    pub fn ids(&self, slot: &str) -> Option<BTreeSet<String>> {
        match self.get(slot)? {
            SeenState::Set { ids } => Some(ids),
            SeenState::Cursor { .. } => {
                warn!(slot = %slot, "Expected set form, found cursor form; treating as empty");
                None
            }
        }
    }
}
