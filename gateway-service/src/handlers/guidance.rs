//! Representative business routes behind the security pipeline.
//!
//! The guidance platform's real handlers live elsewhere; these stubs carry
//! the declared policies so the pipeline is exercisable end to end. The
//! profile route additionally demonstrates the ownership check: students
//! see their own profile, counselors and admins see any.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde_json::{Value, json};
use service_core::error::AppError;
use uuid::Uuid;

use crate::AppState;
use crate::middleware::CurrentContext;
use crate::models::{AuditAction, AuditLogEntry, Role};
use crate::services::{SecurityError, extract_audit_context};

/// Personalized recommendations (students only).
pub async fn recommendations(CurrentContext(context): CurrentContext) -> Json<Value> {
    Json(json!({
        "userId": context.user_id(),
        "recommendations": [
            { "title": "Software Engineer", "stream": "engineering" },
            { "title": "Data Scientist", "stream": "science" }
        ],
        "degraded": context.is_degraded(),
    }))
}

/// A student's profile. Owner-or-staff access.
pub async fn student_profile(
    State(state): State<AppState>,
    CurrentContext(context): CurrentContext,
    headers: HeaderMap,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let is_staff = context.has_role(Role::Counselor) || context.has_role(Role::Admin);

    if !is_staff {
        let owner = state
            .ownership
            .owner_of("student_profiles", profile_id)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Ownership lookup failed: {}", e)))?;

        if !owner.is_some_and(|owner_id| context.is_owner(owner_id)) {
            let audit_ctx = extract_audit_context(
                &headers,
                context.session_id().map(|s| s.to_string()),
            );
            state.audit.record(
                AuditLogEntry::new(
                    context.user_id(),
                    AuditAction::AccessDenied,
                    "student_profiles",
                    Some(profile_id.to_string()),
                )
                .with_details("caller is not the recorded owner"),
                &audit_ctx,
            );
            return Err(SecurityError::InsufficientPermissions.into());
        }
    }

    Ok(Json(json!({
        "profileId": profile_id,
        "viewerId": context.user_id(),
    })))
}

/// Platform-wide reports (admins only).
pub async fn admin_reports() -> Json<Value> {
    Json(json!({
        "reports": [
            { "name": "weekly_signups" },
            { "name": "assessment_completion" }
        ]
    }))
}
