//! Local durable cache for offline data access.
//!
//! This module provides the [`LocalCache`] abstraction the sync coordinator
//! writes every dataset to before touching the network, plus two backends:
//! - `FileCache`: one JSON file per key, wrapped with the time it was saved
//! - `MemoryCache`: in-process map with an optional storage quota
//!
//! Every write replaces the whole entry; there are no partial updates.

pub mod manager;
pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub use manager::{age_display, CachedData, FileCache};
pub use memory::MemoryCache;

/// Key-value store holding one serialized value per key.
pub trait LocalCache: Send {
    /// Stored value for `key`, `None` if nothing was ever written.
    fn read(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value for `key`. Completes before returning.
    fn write(&mut self, key: &str, value: &Value) -> Result<()>;

    /// When `key` was last written, if the backend tracks it.
    fn saved_at(&self, _key: &str) -> Option<DateTime<Utc>> {
        None
    }
}
