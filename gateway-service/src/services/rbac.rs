//! Role-based access control.
//!
//! A pure function of the resolved context and the route's declared policy.
//! No I/O here; the middleware that calls it is responsible for the audit
//! entry and the HTTP mapping.

use crate::models::Role;
use crate::services::auth::AuthContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No valid identity and the route requires one (HTTP 401).
    Unauthenticated,
    /// Valid identity with a role outside the required set (HTTP 403).
    InsufficientPermissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

/// Check `context` against a route's required-role set. An empty set allows
/// unconditionally, including anonymous callers.
pub fn enforce(context: &AuthContext, required_roles: &[Role]) -> AccessDecision {
    if required_roles.is_empty() {
        return AccessDecision::Allow;
    }

    if !context.is_authenticated() {
        return AccessDecision::Deny(DenyReason::Unauthenticated);
    }

    if required_roles.iter().any(|role| context.has_role(*role)) {
        AccessDecision::Allow
    } else {
        AccessDecision::Deny(DenyReason::InsufficientPermissions)
    }
}
