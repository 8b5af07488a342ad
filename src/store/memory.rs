//! In-process store

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::KvStore;

/// `KvStore` backed by a map; state dies with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_many(&self, batch: &[(String, String)]) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        for (key, value) in batch {
            entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("a/1", "x").unwrap();
        store.set("a/2", "y").unwrap();
        store.set("b/1", "z").unwrap();
        store.set("a/1", "x2").unwrap();

        assert_eq!(store.get("a/1").unwrap().as_deref(), Some("x2"));
        assert_eq!(store.keys_with_prefix("a/").unwrap(), vec!["a/1", "a/2"]);

        store.delete("a/1").unwrap();
        assert_eq!(store.get("a/1").unwrap(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_set_many_writes_every_entry() {
        let store = MemoryStore::new();
        store
            .set_many(&[
                ("u/feed".to_string(), "[]".to_string()),
                ("u/seen/a".to_string(), "{}".to_string()),
            ])
            .unwrap();
        assert_eq!(store.keys_with_prefix("u/").unwrap(), vec!["u/feed", "u/seen/a"]);
    }
}
