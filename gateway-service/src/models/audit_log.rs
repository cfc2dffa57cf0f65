//! Audit log model - immutable records of security-relevant decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Security decisions worth reconstructing after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AuthSuccess,
    AuthFailure,
    AccessDenied,
    RateLimitExceeded,
    FileRejected,
    FileAccepted,
    SignIn,
    SignOut,
    SessionRefreshed,
    ActionUnconfirmed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AuthSuccess => "auth_success",
            AuditAction::AuthFailure => "auth_failure",
            AuditAction::AccessDenied => "access_denied",
            AuditAction::RateLimitExceeded => "rate_limit_exceeded",
            AuditAction::FileRejected => "file_rejected",
            AuditAction::FileAccepted => "file_accepted",
            AuditAction::SignIn => "sign_in",
            AuditAction::SignOut => "sign_out",
            AuditAction::SessionRefreshed => "session_refreshed",
            AuditAction::ActionUnconfirmed => "action_unconfirmed",
        }
    }
}

/// Append-only audit entry. Never updated or deleted by this layer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditLogEntry {
    pub entry_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource_table: String,
    pub resource_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub session_id: Option<String>,
    pub details: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        user_id: Option<Uuid>,
        action: AuditAction,
        resource_table: impl Into<String>,
        resource_id: Option<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id,
            action: action.as_str().to_string(),
            resource_table: resource_table.into(),
            resource_id,
            ip_address: "unknown".to_string(),
            user_agent: "unknown".to_string(),
            session_id: None,
            details: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
