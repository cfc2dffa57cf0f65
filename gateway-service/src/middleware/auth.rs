//! Auth context resolution middleware.
//!
//! Runs on every request, before policy checks: pulls the session token
//! from the Authorization header or the session cookie, resolves it, and
//! parks the resulting `AuthContext` in request extensions.

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::AppState;
use crate::models::{AuditAction, AuditLogEntry};
use crate::services::{AuthContext, extract_audit_context};

pub const SESSION_COOKIE: &str = "eduniti_session";

/// Session token from `Authorization: Bearer` or the session cookie, in
/// that order.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string());

    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
    })
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(req.headers());
    let context = state.resolver.resolve(token.as_deref()).await;

    if let Some(token) = token.as_deref() {
        let session_for_audit = context
            .session_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| token.to_string());
        let audit_ctx = extract_audit_context(req.headers(), Some(session_for_audit));

        if context.is_authenticated() {
            let mut entry = AuditLogEntry::new(
                context.user_id(),
                AuditAction::AuthSuccess,
                "sessions",
                None,
            );
            if context.is_degraded() {
                entry = entry.with_details("served from offline cache");
            }
            state.audit.record(entry, &audit_ctx);
        } else if !context.is_degraded() {
            // A presented token that did not resolve is a failed
            // authentication; an unreachable store without cache is not.
            state.audit.record(
                AuditLogEntry::new(None, AuditAction::AuthFailure, "sessions", None)
                    .with_details("session token rejected"),
                &audit_ctx,
            );
        }
    }

    req.extensions_mut().insert(context);
    next.run(req).await
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Extractor handing the resolved context to handlers.
pub struct CurrentContext(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<AuthContext>().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Auth context missing from request extensions".to_string(),
            }),
        ))?;

        Ok(CurrentContext(context.clone()))
    }
}
