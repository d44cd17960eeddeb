use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::LocalCache;
use crate::error::{FinanceError, Result};
use crate::models::Dataset;
use crate::remote::{RemoteDocument, RemoteError, RemoteStore, UserId};

/// Cache key of the identity used when no remote store is configured.
pub const LOCAL_USER_KEY: &str = "localUserId";

/// Connectivity transitions reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    Online,
    Offline,
}

/// Where a successful save ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written locally and to the remote store.
    Synced,
    /// Written locally only; the remote store was unreachable or failed.
    LocalOnly,
}

/// Result of pushing the local datasets to the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: Vec<Dataset>,
    pub failed: Vec<Dataset>,
    /// Offline or unauthenticated; nothing was attempted.
    pub skipped: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.skipped && self.failed.is_empty()
    }
}

/// Single owner of the local cache and the remote store.
///
/// Every method takes `&mut self`, so saves are processed one at a time in
/// call order and the local write of a save always lands before its remote
/// write is attempted.
pub struct SyncCoordinator {
    local: Box<dyn LocalCache>,
    remote: Option<Box<dyn RemoteStore>>,
    user: Option<UserId>,
    /// `user` is a remote identity (not a local-only one).
    authenticated: bool,
    online: bool,
}

impl SyncCoordinator {
    /// Local-only coordinator.
    pub fn new(local: Box<dyn LocalCache>) -> Self {
        Self {
            local,
            remote: None,
            user: None,
            authenticated: false,
            online: true,
        }
    }

    pub fn with_remote(mut self, remote: Box<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Initial connectivity state (defaults to online).
    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    /// Establish the identity datasets are stored under.
    ///
    /// With a remote store this is an anonymous sign-in; a failure is
    /// returned but leaves the coordinator working in local-only mode.
    /// Without one, a persistent `local-<millis>` id is used.
    pub async fn authenticate(&mut self) -> Result<UserId> {
        if self.remote.is_none() {
            let user = self.local_user_id();
            self.user = Some(user.clone());
            return Ok(user);
        }

        if !self.online {
            debug!("Offline, deferring remote sign-in");
            return Err(FinanceError::AuthFailure(
                "offline; sign-in deferred until connectivity returns".to_string(),
            ));
        }

        let signed_in = match self.remote.as_mut() {
            Some(remote) => remote.sign_in().await,
            None => return Err(FinanceError::AuthFailure("no remote store".to_string())),
        };

        match signed_in {
            Ok(user) => {
                info!(user = %user, "Authenticated with remote store");
                self.user = Some(user.clone());
                self.authenticated = true;
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Remote sign-in failed, continuing in local-only mode");
                Err(FinanceError::AuthFailure(e.to_string()))
            }
        }
    }

    fn local_user_id(&mut self) -> UserId {
        if let Some(Value::String(existing)) = self.read_local_key(LOCAL_USER_KEY) {
            return UserId(existing);
        }
        let user = UserId(format!("local-{}", Utc::now().timestamp_millis()));
        if let Err(e) = self
            .local
            .write(LOCAL_USER_KEY, &Value::String(user.0.clone()))
        {
            warn!(error = %e, "Failed to persist local user id");
        }
        info!(user = %user, "Created local user id");
        user
    }

    /// Remote store and identity, when both are usable right now.
    fn remote_target(&mut self) -> Option<(&mut Box<dyn RemoteStore>, &UserId)> {
        if !self.online || !self.authenticated {
            return None;
        }
        match (self.remote.as_mut(), self.user.as_ref()) {
            (Some(remote), Some(user)) => Some((remote, user)),
            _ => None,
        }
    }

    /// Drop an identity the backend no longer acts for and sign in again.
    async fn recover_identity(&mut self, current: &str) -> bool {
        warn!(
            previous = ?self.user.as_ref().map(UserId::as_str),
            current = current,
            "Remote identity changed, signing in again"
        );
        self.authenticated = false;
        self.user = None;
        self.authenticate().await.is_ok()
    }

    /// Fetch from the remote store; `None` when it is not usable right now.
    async fn remote_fetch(
        &mut self,
        dataset: Dataset,
    ) -> Option<std::result::Result<Option<RemoteDocument>, RemoteError>> {
        let first = match self.remote_target() {
            Some((remote, user)) => remote.fetch(user, dataset).await,
            None => return None,
        };
        match first {
            Err(RemoteError::IdentityChanged(current)) => {
                if !self.recover_identity(&current).await {
                    return Some(Err(RemoteError::IdentityChanged(current)));
                }
                let (remote, user) = self.remote_target()?;
                Some(remote.fetch(user, dataset).await)
            }
            other => Some(other),
        }
    }

    /// Store to the remote store; `None` when it is not usable right now.
    async fn remote_store(
        &mut self,
        dataset: Dataset,
        value: &Value,
    ) -> Option<std::result::Result<(), RemoteError>> {
        let first = match self.remote_target() {
            Some((remote, user)) => remote.store(user, dataset, value).await,
            None => return None,
        };
        match first {
            Err(RemoteError::IdentityChanged(current)) => {
                if !self.recover_identity(&current).await {
                    return Some(Err(RemoteError::IdentityChanged(current)));
                }
                let (remote, user) = self.remote_target()?;
                Some(remote.store(user, dataset, value).await)
            }
            other => Some(other),
        }
    }

    fn read_local_key(&self, key: &str) -> Option<Value> {
        match self.local.read(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key, error = %e, "Unreadable local entry, treating as absent");
                None
            }
        }
    }

    /// Current value of a dataset. Never fails; `None` means nothing stored.
    ///
    /// Prefers the remote document and mirrors it into the local cache;
    /// falls back to the local cache on any remote problem.
    pub async fn load(&mut self, dataset: Dataset) -> Option<Value> {
        match self.remote_fetch(dataset).await {
            Some(Ok(Some(doc))) => {
                if let Err(e) = self.local.write(dataset.as_str(), &doc.data) {
                    warn!(dataset = %dataset, error = %e, "Failed to mirror remote data locally");
                }
                debug!(dataset = %dataset, "Loaded from remote store");
                return Some(doc.data);
            }
            Some(Ok(None)) => {
                debug!(dataset = %dataset, "No remote document, using local cache");
            }
            Some(Err(e)) => {
                warn!(dataset = %dataset, error = %e, "Remote load failed, using local cache");
            }
            None => {
                debug!(dataset = %dataset, "Remote unavailable, using local cache");
            }
        }

        self.read_local_key(dataset.as_str())
    }

    /// `load` deserialized into `T`; an undecodable value counts as absent.
    pub async fn load_as<T: DeserializeOwned>(&mut self, dataset: Dataset) -> Option<T> {
        let value = self.load(dataset).await?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                error!(dataset = %dataset, error = %e, "Stored dataset does not decode");
                None
            }
        }
    }

    /// Persist a dataset: local cache first, then the remote store.
    ///
    /// Fails only when the local write fails; remote failures are logged.
    pub async fn save(&mut self, dataset: Dataset, value: &Value) -> Result<SaveOutcome> {
        self.local
            .write(dataset.as_str(), value)
            .map_err(|source| FinanceError::LocalWriteFailure { dataset, source })?;

        match self.remote_store(dataset, value).await {
            Some(Ok(())) => {
                debug!(dataset = %dataset, "Saved locally and remotely");
                Ok(SaveOutcome::Synced)
            }
            Some(Err(e)) => {
                warn!(dataset = %dataset, error = %e, "Remote save failed, kept local copy");
                Ok(SaveOutcome::LocalOnly)
            }
            None => {
                debug!(dataset = %dataset, "Saved locally; remote write skipped");
                Ok(SaveOutcome::LocalOnly)
            }
        }
    }

    pub async fn save_as<T: Serialize>(&mut self, dataset: Dataset, value: &T) -> Result<SaveOutcome> {
        let value = serde_json::to_value(value)?;
        self.save(dataset, &value).await
    }

    /// Push every locally stored dataset to the remote store.
    pub async fn resync(&mut self) -> SyncReport {
        if self.remote_target().is_none() {
            debug!(online = self.online, authenticated = self.authenticated, "Resync skipped");
            return SyncReport::skipped();
        }

        let mut report = SyncReport::default();
        for dataset in Dataset::ALL {
            let Some(value) = self.read_local_key(dataset.as_str()) else {
                continue;
            };
            match self.remote_store(dataset, &value).await {
                Some(Ok(())) => report.pushed.push(dataset),
                Some(Err(e)) => {
                    warn!(dataset = %dataset, error = %e, "Resync push failed");
                    report.failed.push(dataset);
                }
                None => break,
            }
        }
        info!(pushed = report.pushed.len(), failed = report.failed.len(), "Resync finished");
        report
    }

    /// Apply a connectivity transition.
    ///
    /// Returns the resync report when this signal moved the coordinator from
    /// offline to online; repeated signals for the current state are ignored.
    pub async fn handle_connectivity(&mut self, signal: ConnectivitySignal) -> Option<SyncReport> {
        match signal {
            ConnectivitySignal::Offline => {
                if self.online {
                    info!("Connectivity lost");
                    self.online = false;
                }
                None
            }
            ConnectivitySignal::Online => {
                if self.online {
                    return None;
                }
                info!("Connectivity restored");
                self.online = true;
                if self.remote.is_some() && !self.authenticated {
                    // Failure is logged by authenticate; resync then reports skipped.
                    let _ = self.authenticate().await;
                }
                Some(self.resync().await)
            }
        }
    }

    /// When the local copy of a dataset was last written, if known.
    pub fn local_saved_at(&self, dataset: Dataset) -> Option<DateTime<Utc>> {
        self.local.saved_at(dataset.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::remote::MemoryRemote;
    use serde_json::json;

    fn online_pair() -> (SyncCoordinator, MemoryCache, MemoryRemote) {
        let cache = MemoryCache::new();
        let remote = MemoryRemote::new("anon");
        let sync = SyncCoordinator::new(Box::new(cache.clone())).with_remote(Box::new(remote.clone()));
        (sync, cache, remote)
    }

    #[tokio::test]
    async fn test_local_only_identity_persists() {
        let cache = MemoryCache::new();
        let mut first = SyncCoordinator::new(Box::new(cache.clone()));
        let user = first.authenticate().await.unwrap();
        assert!(user.as_str().starts_with("local-"));
        assert!(!first.is_authenticated());

        let mut second = SyncCoordinator::new(Box::new(cache.clone()));
        assert_eq!(second.authenticate().await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_sign_in_failure_is_non_fatal() {
        let (mut sync, cache, remote) = online_pair();
        remote.set_sign_in_fails(true);
        assert!(matches!(
            sync.authenticate().await,
            Err(FinanceError::AuthFailure(_))
        ));

        let outcome = sync.save(Dataset::Budgets, &json!({"2024-01": 10})).await.unwrap();
        assert_eq!(outcome, SaveOutcome::LocalOnly);
        assert!(cache.contains("budgets"));
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_load_prefers_remote_and_mirrors_locally() {
        let (mut sync, cache, remote) = online_pair();
        let user = sync.authenticate().await.unwrap();
        remote.put_document(&user, Dataset::Categories, json!([{"id": 1}]));

        assert_eq!(sync.load(Dataset::Categories).await, Some(json!([{"id": 1}])));
        assert_eq!(cache.read("categories").unwrap(), Some(json!([{"id": 1}])));
    }

    #[tokio::test]
    async fn test_load_falls_back_when_remote_document_missing_or_failing() {
        let (mut sync, mut cache, remote) = online_pair();
        sync.authenticate().await.unwrap();
        cache.write("investments", &json!([])).unwrap();
        assert_eq!(sync.load(Dataset::Investments).await, Some(json!([])));

        remote.set_available(false);
        assert_eq!(sync.load(Dataset::Investments).await, Some(json!([])));
        assert_eq!(sync.load(Dataset::Budgets).await, None);
    }

    #[tokio::test]
    async fn test_save_fails_only_on_local_failure() {
        let cache = MemoryCache::with_quota(8);
        let remote = MemoryRemote::new("anon");
        let mut sync = SyncCoordinator::new(Box::new(cache.clone())).with_remote(Box::new(remote.clone()));
        sync.authenticate().await.unwrap();

        let err = sync
            .save(Dataset::Transactions, &json!(["far too large for the quota"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinanceError::LocalWriteFailure { dataset: Dataset::Transactions, .. }
        ));
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_does_not_fail_save() {
        let (mut sync, cache, remote) = online_pair();
        sync.authenticate().await.unwrap();
        remote.set_available(false);
        let outcome = sync.save(Dataset::Budgets, &json!({})).await.unwrap();
        assert_eq!(outcome, SaveOutcome::LocalOnly);
        assert_eq!(cache.read("budgets").unwrap(), Some(json!({})));
    }

    #[tokio::test]
    async fn test_resync_pushes_local_datasets() {
        let (mut sync, mut cache, remote) = online_pair();
        let user = sync.authenticate().await.unwrap();
        cache.write("transactions", &json!([1])).unwrap();
        cache.write("budgets", &json!({"2024-03": 5})).unwrap();

        let report = sync.resync().await;
        assert_eq!(report.pushed, vec![Dataset::Transactions, Dataset::Budgets]);
        assert!(report.is_clean());
        assert_eq!(remote.document(&user, Dataset::Transactions), Some(json!([1])));
    }

    #[tokio::test]
    async fn test_resync_skipped_offline() {
        let (sync, _cache, remote) = online_pair();
        let mut sync = sync.with_online(false);
        assert!(sync.authenticate().await.is_err());
        assert!(sync.resync().await.skipped);
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_online_transition_resyncs_once() {
        let (mut sync, _cache, remote) = online_pair();
        sync.authenticate().await.unwrap();

        assert!(sync.handle_connectivity(ConnectivitySignal::Offline).await.is_none());
        sync.save(Dataset::Budgets, &json!({"2024-05": 1})).await.unwrap();
        assert_eq!(remote.write_count(), 0);

        let report = sync
            .handle_connectivity(ConnectivitySignal::Online)
            .await
            .unwrap();
        assert_eq!(report.pushed, vec![Dataset::Budgets]);
        assert!(sync.handle_connectivity(ConnectivitySignal::Online).await.is_none());
        assert_eq!(remote.write_count(), 1);
    }

    #[tokio::test]
    async fn test_online_transition_retries_sign_in() {
        let (sync, _cache, remote) = online_pair();
        let mut sync = sync.with_online(false);
        assert!(sync.authenticate().await.is_err());

        let report = sync
            .handle_connectivity(ConnectivitySignal::Online)
            .await
            .unwrap();
        assert!(sync.is_authenticated());
        assert!(!report.skipped);
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_save_follows_a_replaced_identity() {
        let (mut sync, _cache, remote) = online_pair();
        sync.authenticate().await.unwrap();
        remote.set_user("anon-2");

        let outcome = sync.save(Dataset::Budgets, &json!({"2024-08": 40})).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Synced);
        assert_eq!(sync.user_id(), Some(&UserId::from("anon-2")));
        assert!(sync.is_authenticated());
        assert_eq!(
            remote.document(&UserId::from("anon-2"), Dataset::Budgets),
            Some(json!({"2024-08": 40}))
        );
        assert_eq!(remote.document(&UserId::from("anon"), Dataset::Budgets), None);
    }

    #[tokio::test]
    async fn test_load_after_identity_change_reads_new_user() {
        let (mut sync, mut cache, remote) = online_pair();
        sync.authenticate().await.unwrap();
        cache.write("categories", &json!([{"id": 1}])).unwrap();
        remote.set_user("anon-2");

        // The new user has no document yet, so the local copy is kept.
        assert_eq!(sync.load(Dataset::Categories).await, Some(json!([{"id": 1}])));
        assert_eq!(sync.user_id(), Some(&UserId::from("anon-2")));
    }

    #[tokio::test]
    async fn test_identity_change_without_sign_in_goes_local_only() {
        let (mut sync, _cache, remote) = online_pair();
        sync.authenticate().await.unwrap();
        remote.set_user("anon-2");
        remote.set_sign_in_fails(true);

        let outcome = sync.save(Dataset::Budgets, &json!({})).await.unwrap();
        assert_eq!(outcome, SaveOutcome::LocalOnly);
        assert!(!sync.is_authenticated());
        assert!(sync.user_id().is_none());
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_load_as_treats_undecodable_as_absent() {
        let cache = MemoryCache::new();
        let mut writer = cache.clone();
        writer.write("transactions", &json!({"not": "a list"})).unwrap();
        let mut sync = SyncCoordinator::new(Box::new(cache));
        let parsed: Option<Vec<i64>> = sync.load_as(Dataset::Transactions).await;
        assert!(parsed.is_none());
    }
}
