//! Offline auth cache.
//!
//! Holds the last-known-good authentication state so read-path requests keep
//! working through an identity-store outage. The cache is only ever consulted
//! when a lookup fails network-classified; credential rejections bypass it
//! entirely. Sign-out clears it unconditionally.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::models::{SessionRecord, User};

/// Last successful online resolution. Owned exclusively by the cache;
/// last-write-wins by recency.
#[derive(Debug, Clone)]
pub struct CachedAuthState {
    pub user: User,
    pub session: SessionRecord,
    pub last_refreshed_at: DateTime<Utc>,
}

pub struct OfflineAuthCache {
    state: RwLock<Option<CachedAuthState>>,
    ttl: Duration,
}

impl OfflineAuthCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(None),
            ttl,
        }
    }

    /// Write-through after every successful online resolution.
    pub async fn save(&self, user: User, session: SessionRecord) {
        let mut guard = self.state.write().await;
        *guard = Some(CachedAuthState {
            user,
            session,
            last_refreshed_at: Utc::now(),
        });
    }

    /// Serve the cached state for `token`, if it is still fresh. A token
    /// mismatch returns nothing: continuity only applies to the session
    /// that was actually resolved online.
    pub async fn load(&self, token: &str) -> Option<CachedAuthState> {
        let guard = self.state.read().await;
        let cached = guard.as_ref()?;
        if cached.session.token != token {
            return None;
        }
        let now = Utc::now();
        if cached.last_refreshed_at + self.ttl <= now || cached.session.is_expired(now) {
            return None;
        }
        Some(cached.clone())
    }

    /// Replace the cached session after a successful refresh, keyed by the
    /// session's user so a rotated token still lands on the right state.
    pub async fn update_session(&self, session: SessionRecord) {
        let mut guard = self.state.write().await;
        if let Some(cached) = guard.as_mut() {
            if cached.user.id == session.user_id {
                cached.session = session;
                cached.last_refreshed_at = Utc::now();
            }
        }
    }

    /// Unconditional clear. Sign-out calls this before any network I/O so a
    /// failed upstream call can never leave stale local credentials behind.
    pub async fn clear(&self) {
        let mut guard = self.state.write().await;
        *guard = None;
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_none()
    }
}

/// Tracks whether the identity store looked reachable on the last call.
/// The transition offline -> online is what triggers a retry-queue drain.
pub struct ConnectivityMonitor {
    online: AtomicBool,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record a network-classified failure. Returns true on the first
    /// failure after a healthy period.
    pub fn mark_failure(&self) -> bool {
        self.online.swap(false, Ordering::SeqCst)
    }

    /// Record a successful call. Returns true when this call ended an
    /// outage, i.e. connectivity was just restored.
    pub fn mark_success(&self) -> bool {
        !self.online.swap(true, Ordering::SeqCst)
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
