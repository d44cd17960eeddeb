//! Per-user remote document store.
//!
//! Each dataset lives in one document at `users/{uid}/{dataset}/data` holding
//! the whole serialized value plus a server-assigned `lastUpdated` stamp.
//! Two backends are provided:
//! - `FirestoreClient`: Firebase REST API with anonymous authentication
//! - `MemoryRemote`: in-process documents with failure switches for tests

pub mod error;
pub mod firestore;
pub mod memory;
pub mod value;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Dataset;

pub use error::RemoteError;
pub use firestore::FirestoreClient;
pub use memory::MemoryRemote;

/// Identity the remote store scopes documents to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

/// One stored dataset as the remote store returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub data: Value,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Document path for a dataset, relative to the database root.
pub fn document_path(user: &UserId, dataset: Dataset) -> String {
    format!("users/{}/{}/data", user, dataset)
}

#[async_trait]
pub trait RemoteStore: Send {
    /// Establish (or reuse) an anonymous identity.
    async fn sign_in(&mut self) -> Result<UserId, RemoteError>;

    /// Read a dataset document. `Ok(None)` when it was never written.
    async fn fetch(
        &mut self,
        user: &UserId,
        dataset: Dataset,
    ) -> Result<Option<RemoteDocument>, RemoteError>;

    /// Replace a dataset document wholesale.
    async fn store(&mut self, user: &UserId, dataset: Dataset, data: &Value)
        -> Result<(), RemoteError>;
}
