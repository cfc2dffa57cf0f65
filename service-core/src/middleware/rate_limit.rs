//! Request rate limiting.
//!
//! Two limiter styles live here. `FixedWindowLimiter` implements per-key
//! fixed-window admission: the first `limit` requests inside a window are
//! admitted and everything after is denied until the window rolls over.
//! Route-level quotas use this because the admission contract is exact.
//! The governor-based IP limiter below smooths admissions over the window
//! instead, which is the right shape for credential-guessing throttles.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{
    net::SocketAddr,
    num::NonZeroU32,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::error::AppError;

/// One caller's counter for the current window.
#[derive(Debug)]
struct RateWindow {
    count: u32,
    window_start: Instant,
}

/// Outcome of a fixed-window admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Fixed-window counter keyed by an opaque string (typically caller + route).
///
/// The increment-and-compare for a key runs while holding that key's shard
/// entry, so two requests racing on the same key can never both be admitted
/// at the boundary. Expired windows are replaced, never mutated in place.
pub struct FixedWindowLimiter {
    windows: DashMap<String, RateWindow>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Admit or deny one request for `key` under `limit` per `window`.
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| RateWindow {
                count: 0,
                window_start: now,
            });

        let w = entry.value_mut();
        let elapsed = now.saturating_duration_since(w.window_start);
        if elapsed >= window {
            w.window_start = now;
            w.count = 0;
        }

        if w.count < limit {
            w.count += 1;
            RateDecision::Allowed {
                remaining: limit - w.count,
            }
        } else {
            RateDecision::Denied {
                retry_after: window.saturating_sub(now.saturating_duration_since(w.window_start)),
            }
        }
    }

    /// Drop windows idle for longer than `older_than`. Called periodically
    /// so one-off callers don't accumulate forever.
    pub fn purge_stale(&self, older_than: Duration) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.window_start) < older_than);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limiter keyed by IP address (governor-backed).
pub type IpRateLimiter = Arc<RateLimiter<SocketAddr, DashMapStateStore<SocketAddr>, DefaultClock>>;

/// Create a keyed rate limiter (by IP).
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let attempts = attempts.max(1);
    let period = Duration::from_millis((window_seconds * 1000) / attempts as u64);
    let quota = Quota::with_period(period)
        .expect("Failed to create quota with valid period")
        .allow_burst(NonZeroU32::new(attempts).expect("attempts is guaranteed to be non-zero"));

    Arc::new(RateLimiter::dashmap(quota))
}

/// Middleware for IP-based rate limiting.
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok());

    let addr = if let Some(ip) = forwarded_ip {
        Some(SocketAddr::new(ip, 0))
    } else {
        request
            .extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|axum::extract::ConnectInfo(addr)| *addr)
    };

    match addr {
        Some(addr) => match limiter.check_key(&addr) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                Err(AppError::TooManyRequests(
                    "Too many requests. Please try again later.".to_string(),
                    Some(wait_time.as_secs()),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}
