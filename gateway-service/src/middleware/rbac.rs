//! Role policy enforcement middleware.
//!
//! Reads the route's declared `RoutePolicy` and the resolved `AuthContext`
//! out of request extensions, asks the pure enforcer, and short-circuits
//! with a terse 401/403 on denial. Denials are audited here; the business
//! handler is never invoked.

use axum::{extract::{Request, State}, middleware::Next, response::Response};
use service_core::error::AppError;

use crate::AppState;
use crate::middleware::policy::RoutePolicy;
use crate::models::{AuditAction, AuditLogEntry};
use crate::services::rbac::{AccessDecision, DenyReason, enforce};
use crate::services::{AuthContext, SecurityError, extract_audit_context};

pub async fn rbac_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let policy = req
        .extensions()
        .get::<RoutePolicy>()
        .copied()
        .unwrap_or_default();

    let context = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .unwrap_or_else(AuthContext::anonymous);

    match enforce(&context, policy.required_roles) {
        AccessDecision::Allow => Ok(next.run(req).await),
        AccessDecision::Deny(reason) => {
            let endpoint = req.uri().path().to_string();
            tracing::warn!(
                endpoint = %endpoint,
                user_id = ?context.user_id(),
                reason = ?reason,
                "Access denied"
            );

            let audit_ctx = extract_audit_context(
                req.headers(),
                context.session_id().map(|s| s.to_string()),
            );
            state.audit.record(
                AuditLogEntry::new(
                    context.user_id(),
                    AuditAction::AccessDenied,
                    "routes",
                    Some(endpoint),
                )
                .with_details(match reason {
                    DenyReason::Unauthenticated => "no authenticated session",
                    DenyReason::InsufficientPermissions => "role not in required set",
                }),
                &audit_ctx,
            );

            match reason {
                DenyReason::Unauthenticated => Err(SecurityError::Unauthenticated.into()),
                DenyReason::InsufficientPermissions => {
                    Err(SecurityError::InsufficientPermissions.into())
                }
            }
        }
    }
}
