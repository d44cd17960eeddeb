//! Firestore REST client with anonymous Firebase authentication.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{document_path, value, RemoteDocument, RemoteError, RemoteStore, UserId};
use crate::auth::{Session, SessionData};
use crate::config::FirebaseConfig;
use crate::models::Dataset;

// ============================================================================
// Constants
// ============================================================================

const IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

const SECURE_TOKEN_BASE_URL: &str = "https://securetoken.googleapis.com/v1";

const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(rename = "idToken")]
    id_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    #[serde(rename = "localId")]
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
    #[serde(rename = "updateTime")]
    update_time: Option<DateTime<Utc>>,
}

/// Remote store backed by Cloud Firestore.
pub struct FirestoreClient {
    client: Client,
    api_key: String,
    project_id: String,
    session: Session,
    /// Set when the server rejected the cached id token.
    token_rejected: bool,
}

impl FirestoreClient {
    /// Create a client; a session saved in `session_dir` is reused if present.
    pub fn new(config: &FirebaseConfig, session_dir: PathBuf) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let mut session = Session::new(session_dir);
        if let Err(e) = session.load() {
            warn!(error = %e, "Ignoring unreadable session file");
        }

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            project_id: config.project_id.clone(),
            session,
            token_rejected: false,
        })
    }

    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/(default)/documents",
            self.project_id
        )
    }

    /// Fully qualified resource name of a dataset document.
    fn document_name(&self, user: &UserId, dataset: Dataset) -> String {
        format!("{}/{}", self.documents_root(), document_path(user, dataset))
    }

    fn document_url(&self, user: &UserId, dataset: Dataset) -> String {
        format!("{}/{}", FIRESTORE_BASE_URL, self.document_name(user, dataset))
    }

    fn commit_url(&self) -> String {
        format!("{}/{}:commit", FIRESTORE_BASE_URL, self.documents_root())
    }

    /// Whole-document write with `lastUpdated` set by the server.
    fn commit_body(
        &self,
        user: &UserId,
        dataset: Dataset,
        data: &Value,
    ) -> Result<Value, RemoteError> {
        let encoded = value::encode(data)?;
        Ok(json!({
            "writes": [{
                "update": {
                    "name": self.document_name(user, dataset),
                    "fields": { "data": encoded }
                },
                "updateTransforms": [{
                    "fieldPath": "lastUpdated",
                    "setToServerValue": "REQUEST_TIME"
                }]
            }]
        }))
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, RemoteError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
    }

    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, RemoteError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;
            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(RemoteError::RateLimited);
                    }
                    warn!(retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn sign_up(&self) -> Result<SessionData, RemoteError> {
        let url = format!("{}/accounts:signUp?key={}", IDENTITY_BASE_URL, self.api_key);
        let body = json!({ "returnSecureToken": true });
        let response = self
            .send(|| self.client.post(&url).json(&body))
            .await
            .map_err(|e| RemoteError::Auth(format!("anonymous sign-up failed: {}", e)))?;
        let parsed: SignUpResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("sign-up response: {}", e)))?;

        Ok(SessionData {
            user_id: parsed.local_id,
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            created_at: Utc::now(),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionData, RemoteError> {
        let url = format!("{}/token?key={}", SECURE_TOKEN_BASE_URL, self.api_key);
        let form = [("grant_type", "refresh_token"), ("refresh_token", refresh_token)];
        let response = self
            .send(|| self.client.post(&url).form(&form))
            .await
            .map_err(|e| RemoteError::Auth(format!("token refresh failed: {}", e)))?;
        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("refresh response: {}", e)))?;

        Ok(SessionData {
            user_id: parsed.user_id,
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            created_at: Utc::now(),
        })
    }

    fn install(&mut self, data: SessionData) {
        self.session.update(data);
        self.token_rejected = false;
        if let Err(e) = self.session.save() {
            warn!(error = %e, "Failed to persist session");
        }
    }

    /// Current id token, refreshing or signing up again as needed.
    async fn ensure_token(&mut self) -> Result<String, RemoteError> {
        if !self.token_rejected {
            if let Some(token) = self.session.token() {
                return Ok(token.to_string());
            }
        }

        if let Some(refresh_token) = self.session.refresh_token().map(str::to_string) {
            match self.refresh(&refresh_token).await {
                Ok(data) => {
                    debug!(user = %data.user_id, "Refreshed id token");
                    let token = data.id_token.clone();
                    self.install(data);
                    return Ok(token);
                }
                Err(e) => warn!(error = %e, "Token refresh failed, signing up again"),
            }
        }

        let data = self.sign_up().await?;
        if let Some(previous) = self.session.user_id() {
            warn!(previous = previous, user = %data.user_id, "New anonymous user; remote data of the previous one is no longer reachable");
        } else {
            info!(user = %data.user_id, "Signed up anonymously");
        }
        let token = data.id_token.clone();
        self.install(data);
        Ok(token)
    }

    /// Fails when the session now belongs to someone other than `user`.
    ///
    /// A token refresh can fall back to a fresh anonymous sign-up, after
    /// which documents of the old user are no longer readable or writable.
    fn check_identity(&self, user: &UserId) -> Result<(), RemoteError> {
        match self.session.user_id() {
            Some(current) if current != user.as_str() => {
                Err(RemoteError::IdentityChanged(current.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn fetch_once(
        &mut self,
        user: &UserId,
        dataset: Dataset,
    ) -> Result<Option<RemoteDocument>, RemoteError> {
        let token = self.ensure_token().await?;
        self.check_identity(user)?;
        let url = self.document_url(user, dataset);
        let response = match self.send(|| self.client.get(&url).bearer_auth(&token)).await {
            Ok(response) => response,
            Err(RemoteError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let doc: DocumentResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("document {}: {}", dataset, e)))?;
        parse_document(doc)
    }

    async fn store_once(
        &mut self,
        user: &UserId,
        dataset: Dataset,
        data: &Value,
    ) -> Result<(), RemoteError> {
        let token = self.ensure_token().await?;
        self.check_identity(user)?;
        let url = self.commit_url();
        let body = self.commit_body(user, dataset, data)?;
        self.send(|| self.client.post(&url).bearer_auth(&token).json(&body))
            .await?;
        Ok(())
    }
}

fn parse_document(doc: DocumentResponse) -> Result<Option<RemoteDocument>, RemoteError> {
    let Some(data) = doc.fields.get("data") else {
        return Ok(None);
    };
    let last_updated = doc
        .fields
        .get("lastUpdated")
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or(doc.update_time);

    Ok(Some(RemoteDocument {
        data: value::decode(data)?,
        last_updated,
    }))
}

#[async_trait]
impl RemoteStore for FirestoreClient {
    async fn sign_in(&mut self) -> Result<UserId, RemoteError> {
        self.ensure_token().await?;
        self.session
            .user_id()
            .map(UserId::from)
            .ok_or_else(|| RemoteError::Auth("no user id after sign-in".to_string()))
    }

    async fn fetch(
        &mut self,
        user: &UserId,
        dataset: Dataset,
    ) -> Result<Option<RemoteDocument>, RemoteError> {
        match self.fetch_once(user, dataset).await {
            Err(e) if e.needs_reauth() => {
                debug!(dataset = %dataset, "Id token rejected, retrying with a fresh one");
                self.token_rejected = true;
                self.fetch_once(user, dataset).await
            }
            result => result,
        }
    }

    async fn store(
        &mut self,
        user: &UserId,
        dataset: Dataset,
        data: &Value,
    ) -> Result<(), RemoteError> {
        match self.store_once(user, dataset, data).await {
            Err(e) if e.needs_reauth() => {
                debug!(dataset = %dataset, "Id token rejected, retrying with a fresh one");
                self.token_rejected = true;
                self.store_once(user, dataset, data).await
            }
            result => result,
        }
    }
}
