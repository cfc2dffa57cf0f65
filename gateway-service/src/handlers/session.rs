//! Session lifecycle handlers.
//!
//! Sign-in, refresh, and sign-out pass through to the identity store.
//! Mutations interrupted by an outage land on the retry queue and the
//! caller gets an explicit "queued" notice instead of a silent drop.
//! Sign-out clears the offline cache before any network I/O happens.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::middleware::auth::extract_session_token;
use crate::models::{AuditAction, AuditLogEntry, SessionRecord, User};
use crate::services::{SecurityError, extract_audit_context};
use crate::utils::ValidatedJson;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignInRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: User,
    pub session: SessionRecord,
}

/// Sign in against the identity store.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 202, description = "Identity store unreachable; sign-in queued for replay"),
        (status = 401, description = "Credentials rejected"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "Session"
)]
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<SignInRequest>,
) -> Result<Response, AppError> {
    match state.identity.sign_in(&body.email, &body.password).await {
        Ok((user, session)) => {
            state.resolver.note_online_success();
            state
                .offline_cache
                .save(user.clone(), session.clone())
                .await;

            let audit_ctx = extract_audit_context(&headers, Some(session.token.clone()));
            state.audit.record(
                AuditLogEntry::new(Some(user.id), AuditAction::SignIn, "sessions", None),
                &audit_ctx,
            );

            Ok((StatusCode::OK, Json(SessionResponse { user, session })).into_response())
        }
        Err(err) if err.is_network() => {
            state.resolver.note_network_failure();

            let identity = state.identity.clone();
            let cache = state.offline_cache.clone();
            let email = body.email.clone();
            let password = body.password.clone();
            let action_id = state
                .retry_queue
                .enqueue(
                    "sign_in",
                    Box::new(move || {
                        let identity = identity.clone();
                        let cache = cache.clone();
                        let email = email.clone();
                        let password = password.clone();
                        Box::pin(async move {
                            let (user, session) = identity.sign_in(&email, &password).await?;
                            cache.save(user, session).await;
                            Ok(())
                        })
                    }),
                )
                .await;

            let audit_ctx = extract_audit_context(&headers, None);
            state.audit.record(
                AuditLogEntry::new(None, AuditAction::ActionUnconfirmed, "sessions", None)
                    .with_details("sign-in queued during identity store outage"),
                &audit_ctx,
            );

            Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "queued",
                    "actionId": action_id,
                    "detail": "Identity service unreachable; sign-in will be retried when connectivity returns"
                })),
            )
                .into_response())
        }
        Err(err) => {
            state.resolver.note_online_success();

            let audit_ctx = extract_audit_context(&headers, None);
            state.audit.record(
                AuditLogEntry::new(None, AuditAction::AuthFailure, "sessions", None)
                    .with_details("sign-in rejected"),
                &audit_ctx,
            );

            match err.classify() {
                crate::services::ErrorClass::Credential => {
                    Err(SecurityError::IdentityStoreRejected(err.to_string()).into())
                }
                // Unclassified failures fail closed without implying the
                // credentials were wrong.
                _ => Err(AppError::InternalError(anyhow::anyhow!(
                    "identity store failure: {}",
                    err
                ))),
            }
        }
    }
}

/// Extend the current session.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Session refreshed", body = SessionRecord),
        (status = 202, description = "Identity store unreachable; refresh queued for replay"),
        (status = 401, description = "No session or session rejected")
    ),
    tag = "Session"
)]
pub async fn refresh_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| AppError::from(SecurityError::Unauthenticated))?;

    match state.identity.refresh_session(&token).await {
        Ok(session) => {
            state.resolver.note_online_success();
            state.offline_cache.update_session(session.clone()).await;

            let audit_ctx = extract_audit_context(&headers, Some(session.token.clone()));
            state.audit.record(
                AuditLogEntry::new(
                    Some(session.user_id),
                    AuditAction::SessionRefreshed,
                    "sessions",
                    None,
                ),
                &audit_ctx,
            );

            Ok((StatusCode::OK, Json(session)).into_response())
        }
        Err(err) if err.is_network() => {
            state.resolver.note_network_failure();

            let identity = state.identity.clone();
            let cache = state.offline_cache.clone();
            let token_for_replay = token.clone();
            let action_id = state
                .retry_queue
                .enqueue(
                    "refresh_session",
                    Box::new(move || {
                        let identity = identity.clone();
                        let cache = cache.clone();
                        let token = token_for_replay.clone();
                        Box::pin(async move {
                            let session = identity.refresh_session(&token).await?;
                            cache.update_session(session).await;
                            Ok(())
                        })
                    }),
                )
                .await;

            let audit_ctx = extract_audit_context(&headers, Some(token));
            state.audit.record(
                AuditLogEntry::new(None, AuditAction::ActionUnconfirmed, "sessions", None)
                    .with_details("refresh queued during identity store outage"),
                &audit_ctx,
            );

            Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "queued",
                    "actionId": action_id,
                    "detail": "Identity service unreachable; refresh will be retried when connectivity returns"
                })),
            )
                .into_response())
        }
        Err(err) => {
            state.resolver.note_online_success();
            match err.classify() {
                crate::services::ErrorClass::Credential => {
                    Err(SecurityError::IdentityStoreRejected(err.to_string()).into())
                }
                _ => Err(AppError::InternalError(anyhow::anyhow!(
                    "identity store failure: {}",
                    err
                ))),
            }
        }
    }
}

/// Sign out. The local cache is cleared before the upstream call, so the
/// intent to deauthenticate holds even when the identity store is down.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Signed out")),
    tag = "Session"
)]
pub async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.offline_cache.clear().await;

    let token = extract_session_token(&headers);
    let audit_ctx = extract_audit_context(&headers, token.clone());

    if let Some(token) = token {
        match state.identity.sign_out(&token).await {
            Ok(()) => {
                state.resolver.note_online_success();
                state.audit.record(
                    AuditLogEntry::new(None, AuditAction::SignOut, "sessions", None),
                    &audit_ctx,
                );
            }
            Err(err) if err.is_network() => {
                state.resolver.note_network_failure();

                let identity = state.identity.clone();
                let token_for_replay = token.clone();
                state
                    .retry_queue
                    .enqueue(
                        "sign_out",
                        Box::new(move || {
                            let identity = identity.clone();
                            let token = token_for_replay.clone();
                            Box::pin(async move { identity.sign_out(&token).await })
                        }),
                    )
                    .await;

                state.audit.record(
                    AuditLogEntry::new(None, AuditAction::SignOut, "sessions", None)
                        .with_details("upstream sign-out queued during outage"),
                    &audit_ctx,
                );
            }
            Err(err) => {
                // Upstream already considers the session gone; local state
                // is cleared either way.
                tracing::debug!(error = %err, "Sign-out rejected upstream");
                state.resolver.note_online_success();
                state.audit.record(
                    AuditLogEntry::new(None, AuditAction::SignOut, "sessions", None),
                    &audit_ctx,
                );
            }
        }
    }

    Ok((StatusCode::OK, Json(json!({ "status": "signed_out" }))).into_response())
}

/// Manually trigger a retry-queue drain. Operational surface for
/// connectivity-restored signals that arrive out of band.
#[utoipa::path(
    post,
    path = "/internal/reconnect",
    responses((status = 200, description = "Drain report")),
    tag = "Internal"
)]
pub async fn reconnect(State(state): State<AppState>) -> Result<Response, AppError> {
    let report = state.retry_queue.drain_on_reconnect().await;
    Ok((StatusCode::OK, Json(report)).into_response())
}
