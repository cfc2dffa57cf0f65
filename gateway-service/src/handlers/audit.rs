//! Audit query handler.
//!
//! Read-only view over the append-only audit trail, for admins
//! reconstructing who did what, from where, when.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Serialize;
use service_core::error::AppError;

use crate::AppState;
use crate::models::AuditLogEntry;
use crate::services::AuditQuery;

#[derive(Debug, Serialize)]
pub struct AuditEventsResponse {
    pub events: Vec<AuditLogEntry>,
    pub limit: i64,
    pub offset: i64,
}

/// List audit entries with filtering and clamped pagination.
///
/// GET /audit/events
#[utoipa::path(
    get,
    path = "/audit/events",
    responses(
        (status = 200, description = "Matching audit entries"),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "Audit"
)]
#[tracing::instrument(skip(state), fields(action = ?query.action, limit = query.limit))]
pub async fn list_audit_events(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditEventsResponse>, AppError> {
    let limit = query.limit.clamp(1, 1000);
    let offset = query.offset.max(0);

    let events = state
        .audit
        .store()
        .list(AuditQuery {
            limit,
            offset,
            ..query
        })
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Audit query failed: {}", e)))?;

    Ok(Json(AuditEventsResponse {
        events,
        limit,
        offset,
    }))
}
