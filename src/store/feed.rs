//! Last assembled feed, cached locally so one-shot runs see the same feed a
//! long-running watcher would

use anyhow::Result;
use std::sync::Arc;

use super::{json_entry, load_json, save_json, KvStore, Namespace};
use crate::notification::NotificationRecord;

#[derive(Clone)]
pub struct FeedStore {
    kv: Arc<dyn KvStore>,
    ns: Namespace,
}

impl FeedStore {
    pub fn new(kv: Arc<dyn KvStore>, ns: Namespace) -> Self {
        Self { kv, ns }
    }

    pub fn get(&self) -> Vec<NotificationRecord> {
        load_json(self.kv.as_ref(), &self.ns.feed()).unwrap_or_default()
    }

    pub fn set(&self, feed: &[NotificationRecord]) -> Result<()> {
        save_json(self.kv.as_ref(), &self.ns.feed(), &feed)
    }

    pub fn entry(&self, feed: &[NotificationRecord]) -> Result<(String, String)> {
        json_entry(self.ns.feed(), &feed)
    }
}
