//! Secure upload handler.
//!
//! Runs the file security pipeline and returns the structured validation
//! result either way, so clients can render field-level feedback.

use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use service_core::error::AppError;

use crate::AppState;
use crate::middleware::CurrentContext;
use crate::models::{AuditAction, AuditLogEntry};
use crate::services::file_security::{UploadOptions, secure_upload};
use crate::services::extract_audit_context;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Store under a server-generated name instead of the client's.
    #[serde(default)]
    pub unique_name: bool,
}

/// Validate, scan, and accept or reject an upload.
#[utoipa::path(
    post,
    path = "/files/upload",
    params(("unique_name" = bool, Query, description = "Generate a server-side file name")),
    responses(
        (status = 200, description = "Upload accepted", body = crate::services::SecureUploadOutcome),
        (status = 400, description = "Upload rejected; body carries the validation result"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    CurrentContext(context): CurrentContext,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid multipart payload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("unnamed").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read upload: {}", e)))?;

        let outcome = secure_upload(
            &file_name,
            &mime_type,
            &bytes,
            &state.config.upload,
            UploadOptions {
                generate_unique_file_name: query.unique_name,
            },
            state.scanner.as_ref(),
        );

        let audit_ctx = extract_audit_context(
            &headers,
            context.session_id().map(|s| s.to_string()),
        );
        if outcome.success {
            state.audit.record(
                AuditLogEntry::new(
                    context.user_id(),
                    AuditAction::FileAccepted,
                    "uploads",
                    Some(outcome.validation.file_hash.clone()),
                ),
                &audit_ctx,
            );
            return Ok((StatusCode::OK, Json(outcome)).into_response());
        }

        let first_error = outcome
            .validation
            .errors
            .first()
            .cloned()
            .unwrap_or_else(|| "rejected".to_string());
        state.audit.record(
            AuditLogEntry::new(
                context.user_id(),
                AuditAction::FileRejected,
                "uploads",
                Some(outcome.validation.file_hash.clone()),
            )
            .with_details(first_error),
            &audit_ctx,
        );
        return Ok((StatusCode::BAD_REQUEST, Json(outcome)).into_response());
    }

    Err(AppError::BadRequest(anyhow::anyhow!(
        "Multipart payload is missing a 'file' field"
    )))
}
