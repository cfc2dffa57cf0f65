//! Declarative per-route security policy.
//!
//! Handlers do not call the enforcer or the limiter themselves; route
//! groups declare what they need and the middleware stack reads the policy
//! out of request extensions.

use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoutePolicy {
    /// Roles allowed through. Empty means public.
    pub required_roles: &'static [Role],
    /// Route-specific quota; `None` falls back to the configured default.
    pub rate_limit: Option<RateLimitPolicy>,
}

impl RoutePolicy {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn roles(required_roles: &'static [Role]) -> Self {
        Self {
            required_roles,
            rate_limit: None,
        }
    }

    /// Any signed-in user, regardless of role.
    pub fn authenticated() -> Self {
        Self::roles(&[Role::Student, Role::Counselor, Role::Admin])
    }

    pub fn with_rate_limit(mut self, max_requests: u32, window_ms: u64) -> Self {
        self.rate_limit = Some(RateLimitPolicy {
            max_requests,
            window_ms,
        });
        self
    }
}
