//! Read-state: notification ids the user has acknowledged
//!
//! Independent of seen-state. Marking an item read never changes whether a
//! later poll synthesizes it again.

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{load_json, save_json, KvStore, Namespace};

#[derive(Clone)]
pub struct ReadStore {
    kv: Arc<dyn KvStore>,
    ns: Namespace,
}

impl ReadStore {
    pub fn new(kv: Arc<dyn KvStore>, ns: Namespace) -> Self {
        Self { kv, ns }
    }

    pub fn get(&self) -> BTreeSet<String> {
        load_json(self.kv.as_ref(), &self.ns.read()).unwrap_or_default()
    }

    /// Full replace
    pub fn set(&self, ids: &BTreeSet<String>) -> Result<()> {
        save_json(self.kv.as_ref(), &self.ns.read(), ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_read_state_is_per_user() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let alice = ReadStore::new(kv.clone(), Namespace::new("alice"));
        let bob = ReadStore::new(kv, Namespace::new("bob"));

        let ids: BTreeSet<String> = ["ai_grading:s1:graded".to_string()].into_iter().collect();
        alice.set(&ids).unwrap();

        assert_eq!(alice.get(), ids);
        assert!(bob.get().is_empty());
    }

    #[test]
    fn test_corrupt_read_state_is_empty() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("u1/read", "oops").unwrap();
        let store = ReadStore::new(kv, Namespace::new("u1"));
        assert!(store.get().is_empty());
    }
}
