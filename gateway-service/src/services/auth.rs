//! Auth context resolution.
//!
//! Turns a raw session token into the per-request `AuthContext` every
//! downstream check keys on. Online resolutions write through to the
//! offline cache; network-classified failures fall back to it (read-path
//! continuity only); credential-classified failures never do.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Role, User};
use crate::services::identity::{ErrorClass, IdentityStore};
use crate::services::offline_cache::{ConnectivityMonitor, OfflineAuthCache};
use crate::services::retry_queue::RetryQueue;

/// Resolved identity and authorization facts for one request.
/// Constructed once per request; immutable afterwards.
#[derive(Debug, Clone)]
pub struct AuthContext {
    user: Option<User>,
    session_id: Option<String>,
    degraded: bool,
}

impl AuthContext {
    pub fn authenticated(user: User, session_id: impl Into<String>) -> Self {
        Self {
            user: Some(user),
            session_id: Some(session_id.into()),
            degraded: false,
        }
    }

    /// Context served from the offline cache during an outage. Valid for
    /// read authorization only; mutating auth operations must not trust it.
    pub fn degraded(user: User, session_id: impl Into<String>) -> Self {
        Self {
            user: Some(user),
            session_id: Some(session_id.into()),
            degraded: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: None,
            session_id: None,
            degraded: false,
        }
    }

    fn anonymous_degraded() -> Self {
        Self {
            user: None,
            session_id: None,
            degraded: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// True when this context was built from cached state because the
    /// identity store was unreachable.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.user.as_ref().is_some_and(|u| u.role == role)
    }

    pub fn is_owner(&self, resource_owner_id: Uuid) -> bool {
        self.user.as_ref().is_some_and(|u| u.id == resource_owner_id)
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

/// Resolves session tokens into `AuthContext`s.
#[derive(Clone)]
pub struct AuthResolver {
    identity: Arc<dyn IdentityStore>,
    cache: Arc<OfflineAuthCache>,
    connectivity: Arc<ConnectivityMonitor>,
    retry_queue: Arc<RetryQueue>,
}

impl AuthResolver {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        cache: Arc<OfflineAuthCache>,
        connectivity: Arc<ConnectivityMonitor>,
        retry_queue: Arc<RetryQueue>,
    ) -> Self {
        Self {
            identity,
            cache,
            connectivity,
            retry_queue,
        }
    }

    /// Resolve a request's session token. Never fails: requests without a
    /// usable identity proceed with an unauthenticated context and are
    /// stopped later by whatever policy the route declares.
    pub async fn resolve(&self, token: Option<&str>) -> AuthContext {
        let Some(token) = token else {
            return AuthContext::anonymous();
        };

        match self.identity.resolve_session(token).await {
            Ok((user, session)) => {
                self.cache.save(user.clone(), session.clone()).await;
                self.note_online_success();
                AuthContext::authenticated(user, session.token)
            }
            Err(err) => match err.classify() {
                ErrorClass::Network => {
                    self.note_network_failure();
                    match self.cache.load(token).await {
                        Some(cached) => {
                            tracing::warn!(
                                user_id = %cached.user.id,
                                "Identity store unreachable; serving cached auth state"
                            );
                            AuthContext::degraded(cached.user, cached.session.token)
                        }
                        None => AuthContext::anonymous_degraded(),
                    }
                }
                ErrorClass::Credential => {
                    // Not a connectivity problem: an expired or revoked
                    // session must surface, never be papered over by cache.
                    tracing::debug!(error = %err, "Session rejected by identity store");
                    AuthContext::anonymous()
                }
                ErrorClass::Unknown => {
                    tracing::error!(error = %err, "Unclassified identity store failure");
                    AuthContext::anonymous()
                }
            },
        }
    }

    /// Record a successful identity-store call. If it ended an outage, kick
    /// off a retry-queue drain in the background.
    pub fn note_online_success(&self) {
        if self.connectivity.mark_success() {
            let queue = self.retry_queue.clone();
            tracing::info!("Identity store connectivity restored; draining retry queue");
            tokio::spawn(async move {
                let report = queue.drain_on_reconnect().await;
                if !report.already_draining {
                    tracing::info!(
                        replayed = report.replayed.len(),
                        unconfirmed = report.unconfirmed.len(),
                        remaining = report.remaining,
                        "Retry queue drain finished"
                    );
                }
            });
        }
    }

    /// Record a network-classified identity-store failure.
    pub fn note_network_failure(&self) {
        self.connectivity.mark_failure();
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }
}
