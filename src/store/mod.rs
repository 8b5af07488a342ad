//! Persisted local state
//!
//! All state lives in an injected `KvStore`, namespaced per user:
//!
//! | Key | Contents |
//! |-----|----------|
//! | `{user}/seen/{slot}` | `SeenState` for one diff slot |
//! | `{user}/read` | acknowledged notification ids |
//! | `{user}/feed` | last assembled feed |
//! | `{user}/prefs/{role}` | `PreferenceSet` |
//!
//! Typed stores only expose whole-value `get`/`set`. A value that fails to parse
//! reads as empty and is logged, never surfaced as an error.

pub mod feed;
pub mod file;
pub mod memory;
pub mod preferences;
pub mod read;
pub mod seen;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::notification::Role;

pub use feed::FeedStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use preferences::{PreferenceSet, PreferenceStore};
pub use read::ReadStore;
pub use seen::{Cursor, SeenState, SeenStore};

/// Pluggable key/value persistence
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Full replace
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Replace several keys as one unit: on error none of them changed
    fn set_many(&self, entries: &[(String, String)]) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Key builder for one user's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    user: String,
}

impl Namespace {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Prefix shared by every key of this user
    pub fn prefix(&self) -> String {
        format!("{}/", self.user)
    }

    pub fn seen(&self, slot: &str) -> String {
        format!("{}/seen/{}", self.user, slot)
    }

    pub fn read(&self) -> String {
        format!("{}/read", self.user)
    }

    pub fn feed(&self) -> String {
        format!("{}/feed", self.user)
    }

    pub fn prefs(&self, role: Role) -> String {
        format!("{}/prefs/{}", self.user, role.as_str())
    }
}

/// Read and parse a JSON value; storage or parse failures read as `None`
pub(crate) fn load_json<T: DeserializeOwned>(kv: &dyn KvStore, key: &str) -> Option<T> {
    let raw = match kv.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read persisted state, treating as empty");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "Corrupt persisted state, treating as empty");
            None
        }
    }
}

pub(crate) fn save_json<T: Serialize>(kv: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    kv.set(key, &serde_json::to_string(value)?)
}

/// Serialize a value into a `(key, json)` pair for `KvStore::set_many`
pub(crate) fn json_entry<T: Serialize>(key: String, value: &T) -> Result<(String, String)> {
    Ok((key, serde_json::to_string(value)?))
}
