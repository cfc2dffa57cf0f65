//! Session model - an opaque token the identity store vouches for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Session record as held by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionRecord {
    /// Opaque session token presented by the caller.
    pub token: String,
    pub user_id: Uuid,
    #[schema(value_type = String, format = "date-time")]
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(token: impl Into<String>, user_id: Uuid, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            user_id,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
