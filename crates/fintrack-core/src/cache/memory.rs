use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::LocalCache;

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, (String, DateTime<Utc>)>,
    quota_bytes: Option<usize>,
}

/// In-process cache, optionally bounded by a byte quota like browser storage.
///
/// Clones share the same entries, so a test can keep a handle after the
/// cache has been moved into a coordinator.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes that would push the serialized total past `bytes` fail.
    pub fn with_quota(bytes: usize) -> Self {
        let cache = Self::new();
        cache.set_quota(Some(bytes));
        cache
    }

    pub fn set_quota(&self, bytes: Option<usize>) {
        self.lock().quota_bytes = bytes;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn used_bytes(&self) -> usize {
        self.lock().entries.values().map(|(raw, _)| raw.len()).sum()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LocalCache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        match self.lock().entries.get(key) {
            Some((raw, _)) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn write(&mut self, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let mut state = self.lock();
        if let Some(quota) = state.quota_bytes {
            let others: usize = state
                .entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, (v, _))| v.len())
                .sum();
            if others + raw.len() > quota {
                bail!(
                    "storage quota exceeded writing {} ({} + {} > {} bytes)",
                    key,
                    others,
                    raw.len(),
                    quota
                );
            }
        }
        state.entries.insert(key.to_string(), (raw, Utc::now()));
        Ok(())
    }

    fn saved_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.lock().entries.get(key).map(|(_, at)| *at)
    }
}
