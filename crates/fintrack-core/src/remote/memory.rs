use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{RemoteDocument, RemoteError, RemoteStore, UserId};
use crate::models::Dataset;

#[derive(Debug)]
struct RemoteState {
    documents: HashMap<(UserId, Dataset), RemoteDocument>,
    user: UserId,
    available: bool,
    sign_in_fails: bool,
    writes: usize,
}

/// In-process remote store.
///
/// Clones share documents and switches, so a test can flip availability
/// after handing the store to a coordinator.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new("memory-user")
    }
}

impl MemoryRemote {
    pub fn new(user: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(RemoteState {
                documents: HashMap::new(),
                user: UserId::from(user),
                available: true,
                sign_in_fails: false,
                writes: 0,
            })),
        }
    }

    /// When false, every fetch and store fails as if the network were down.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub fn set_sign_in_fails(&self, fails: bool) {
        self.lock().sign_in_fails = fails;
    }

    /// Replace the signed-in identity, as when a session is lost server-side.
    pub fn set_user(&self, user: &str) {
        self.lock().user = UserId::from(user);
    }

    pub fn document(&self, user: &UserId, dataset: Dataset) -> Option<Value> {
        self.lock()
            .documents
            .get(&(user.clone(), dataset))
            .map(|doc| doc.data.clone())
    }

    pub fn put_document(&self, user: &UserId, dataset: Dataset, data: Value) {
        self.lock().documents.insert(
            (user.clone(), dataset),
            RemoteDocument {
                data,
                last_updated: Some(Utc::now()),
            },
        );
    }

    /// Successful stores so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(state: &RemoteState) -> Result<(), RemoteError> {
        if state.available {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("memory remote switched off".to_string()))
        }
    }

    fn check_user(state: &RemoteState, user: &UserId) -> Result<(), RemoteError> {
        if *user == state.user {
            Ok(())
        } else {
            Err(RemoteError::IdentityChanged(state.user.to_string()))
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn sign_in(&mut self) -> Result<UserId, RemoteError> {
        let state = self.lock();
        if state.sign_in_fails {
            return Err(RemoteError::Auth("anonymous sign-in disabled".to_string()));
        }
        Ok(state.user.clone())
    }

    async fn fetch(
        &mut self,
        user: &UserId,
        dataset: Dataset,
    ) -> Result<Option<RemoteDocument>, RemoteError> {
        let state = self.lock();
        Self::check_available(&state)?;
        Self::check_user(&state, user)?;
        Ok(state.documents.get(&(user.clone(), dataset)).cloned())
    }

    async fn store(
        &mut self,
        user: &UserId,
        dataset: Dataset,
        data: &Value,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        Self::check_user(&state, user)?;
        state.documents.insert(
            (user.clone(), dataset),
            RemoteDocument {
                data: data.clone(),
                last_updated: Some(Utc::now()),
            },
        );
        state.writes += 1;
        Ok(())
    }
}
