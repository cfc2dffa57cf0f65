//! Identity store adapter.
//!
//! The platform's identity provider is an external service; the gateway
//! talks to it through the `IdentityStore` trait so the HTTP client can be
//! swapped for an in-memory fake in tests and single-node dev setups.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

use crate::models::{SessionRecord, User};

/// Failure classes the resolver and retry queue key their policy on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connectivity problem; cached auth state may cover the read path.
    Network,
    /// The credential itself was rejected; never masked by the cache.
    Credential,
    Unknown,
}

#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    #[error("identity store unreachable: {0}")]
    Unavailable(String),

    #[error("credentials rejected: {0}")]
    Rejected(String),

    #[error("identity store error: {0}")]
    Other(String),
}

impl IdentityError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            IdentityError::Unavailable(_) => ErrorClass::Network,
            IdentityError::Rejected(_) => ErrorClass::Credential,
            IdentityError::Other(_) => ErrorClass::Unknown,
        }
    }

    pub fn is_network(&self) -> bool {
        self.classify() == ErrorClass::Network
    }
}

/// Thin interface to the identity provider.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up a session token, returning the owning user and session.
    async fn resolve_session(&self, token: &str) -> Result<(User, SessionRecord), IdentityError>;

    async fn sign_in(&self, email: &str, password: &str)
        -> Result<(User, SessionRecord), IdentityError>;

    async fn refresh_session(&self, token: &str) -> Result<SessionRecord, IdentityError>;

    async fn sign_out(&self, token: &str) -> Result<(), IdentityError>;
}

// ============================================================================
// HTTP-backed implementation
// ============================================================================

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    user: User,
    session: SessionRecord,
}

/// Production adapter: JSON over HTTP to the identity service. The client is
/// constructed once at startup and injected; no lazily-initialized globals.
pub struct HttpIdentityStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn classify_transport(err: reqwest::Error) -> IdentityError {
        if err.is_timeout() || err.is_connect() {
            IdentityError::Unavailable(err.to_string())
        } else {
            IdentityError::Other(err.to_string())
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: String) -> IdentityError {
        if status.is_server_error() {
            IdentityError::Unavailable(format!("upstream {}: {}", status, body))
        } else if matches!(status.as_u16(), 401 | 403 | 404 | 422) {
            IdentityError::Rejected(format!("upstream {}: {}", status, body))
        } else {
            IdentityError::Other(format!("upstream {}: {}", status, body))
        }
    }

    async fn parse_envelope(
        response: reqwest::Response,
    ) -> Result<SessionEnvelope, IdentityError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }
        response
            .json::<SessionEnvelope>()
            .await
            .map_err(|e| IdentityError::Other(format!("malformed identity response: {}", e)))
    }
}

#[async_trait]
impl IdentityStore for HttpIdentityStore {
    async fn resolve_session(&self, token: &str) -> Result<(User, SessionRecord), IdentityError> {
        let response = self
            .client
            .get(format!("{}/sessions/{}", self.base_url, token))
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let envelope = Self::parse_envelope(response).await?;
        Ok((envelope.user, envelope.session))
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, SessionRecord), IdentityError> {
        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let envelope = Self::parse_envelope(response).await?;
        Ok((envelope.user, envelope.session))
    }

    async fn refresh_session(&self, token: &str) -> Result<SessionRecord, IdentityError> {
        let response = self
            .client
            .post(format!("{}/sessions/{}/refresh", self.base_url, token))
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }
        response
            .json::<SessionRecord>()
            .await
            .map_err(|e| IdentityError::Other(format!("malformed identity response: {}", e)))
    }

    async fn sign_out(&self, token: &str) -> Result<(), IdentityError> {
        let response = self
            .client
            .delete(format!("{}/sessions/{}", self.base_url, token))
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }
        Ok(())
    }
}

// ============================================================================
// In-memory implementation (tests, single-node dev)
// ============================================================================

/// Injected fault, for exercising outage and rejection paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// Every call fails network-classified.
    Offline,
    /// Every call fails credential-classified.
    Reject,
}

#[derive(Clone)]
struct Account {
    password: String,
    user: User,
}

/// In-memory identity store keyed by session token.
pub struct InMemoryIdentityStore {
    sessions: DashMap<String, (User, SessionRecord)>,
    accounts: DashMap<String, Account>,
    fault: RwLock<Option<StoreFault>>,
    session_ttl: chrono::Duration,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            accounts: DashMap::new(),
            fault: RwLock::new(None),
            session_ttl: chrono::Duration::minutes(30),
        }
    }

    pub fn register_account(&self, email: &str, password: &str, user: User) {
        self.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user,
            },
        );
    }

    pub fn insert_session(&self, token: &str, user: User) -> SessionRecord {
        let session = SessionRecord::new(token, user.id, Utc::now() + self.session_ttl);
        self.sessions
            .insert(token.to_string(), (user, session.clone()));
        session
    }

    pub fn set_fault(&self, fault: Option<StoreFault>) {
        *self.fault.write().unwrap_or_else(|e| e.into_inner()) = fault;
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn check_fault(&self) -> Result<(), IdentityError> {
        match *self.fault.read().unwrap_or_else(|e| e.into_inner()) {
            Some(StoreFault::Offline) => Err(IdentityError::Unavailable(
                "injected connectivity fault".to_string(),
            )),
            Some(StoreFault::Reject) => Err(IdentityError::Rejected(
                "injected credential fault".to_string(),
            )),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn resolve_session(&self, token: &str) -> Result<(User, SessionRecord), IdentityError> {
        self.check_fault()?;
        let entry = self
            .sessions
            .get(token)
            .ok_or_else(|| IdentityError::Rejected("unknown session".to_string()))?;
        let (user, session) = entry.value().clone();
        if session.is_expired(Utc::now()) {
            return Err(IdentityError::Rejected("session expired".to_string()));
        }
        Ok((user, session))
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, SessionRecord), IdentityError> {
        self.check_fault()?;
        let account = self
            .accounts
            .get(email)
            .ok_or_else(|| IdentityError::Rejected("unknown account".to_string()))?;
        if account.password != password {
            return Err(IdentityError::Rejected("wrong password".to_string()));
        }
        let user = account.user.clone();
        drop(account);
        let token = uuid::Uuid::new_v4().to_string();
        let session = self.insert_session(&token, user.clone());
        Ok((user, session))
    }

    async fn refresh_session(&self, token: &str) -> Result<SessionRecord, IdentityError> {
        self.check_fault()?;
        let mut entry = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| IdentityError::Rejected("unknown session".to_string()))?;
        let (_, session) = entry.value_mut();
        session.expires_at = Utc::now() + self.session_ttl;
        Ok(session.clone())
    }

    async fn sign_out(&self, token: &str) -> Result<(), IdentityError> {
        self.check_fault()?;
        self.sessions.remove(token);
        Ok(())
    }
}
