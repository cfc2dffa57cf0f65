//! Audit logging.
//!
//! Every security-relevant decision lands in the append-only `audit_logs`
//! table. Writes are fire-and-forget from the request's point of view: a
//! failing store is reported to telemetry, never back into the response.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::AuditLogEntry;

/// Request facts attached to every audit entry.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub ip_address: String,
    pub user_agent: String,
    pub session_id: Option<String>,
}

/// Derive the audit context from request headers. The forwarded-address
/// header wins (first hop); anything missing defaults to "unknown".
pub fn extract_audit_context(headers: &HeaderMap, session_id: Option<String>) -> AuditContext {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    AuditContext {
        ip_address,
        user_agent,
        session_id,
    }
}

/// Filters for the audit query endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub user_id: Option<Uuid>,
    pub from_utc: Option<DateTime<Utc>>,
    pub to_utc: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// Append-only persistence for audit entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), anyhow::Error>;

    async fn list(&self, query: AuditQuery) -> Result<Vec<AuditLogEntry>, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

// ============================================================================
// PostgreSQL store
// ============================================================================

pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO audit_logs \
             (entry_id, user_id, action, resource_table, resource_id, \
              ip_address, user_agent, session_id, details, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(entry.entry_id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource_table)
        .bind(&entry.resource_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.session_id)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, query: AuditQuery) -> Result<Vec<AuditLogEntry>, anyhow::Error> {
        let limit = query.limit.clamp(1, 1000);
        let offset = query.offset.max(0);

        let entries = sqlx::query_as::<_, AuditLogEntry>(
            "SELECT entry_id, user_id, action, resource_table, resource_id, \
                    ip_address, user_agent, session_id, details, created_at \
             FROM audit_logs \
             WHERE ($1::text IS NULL OR action = $1) \
               AND ($2::uuid IS NULL OR user_id = $2) \
               AND ($3::timestamptz IS NULL OR created_at >= $3) \
               AND ($4::timestamptz IS NULL OR created_at <= $4) \
             ORDER BY created_at DESC \
             LIMIT $5 OFFSET $6",
        )
        .bind(&query.action)
        .bind(query.user_id)
        .bind(query.from_utc)
        .bind(query.to_utc)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// In-memory store (tests, single-node dev)
// ============================================================================

#[derive(Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }

    async fn list(&self, query: AuditQuery) -> Result<Vec<AuditLogEntry>, anyhow::Error> {
        let limit = query.limit.clamp(1, 1000) as usize;
        let offset = query.offset.max(0) as usize;

        let mut entries: Vec<AuditLogEntry> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| query.action.as_ref().is_none_or(|a| &e.action == a))
            .filter(|e| query.user_id.is_none_or(|u| e.user_id == Some(u)))
            .filter(|e| query.from_utc.is_none_or(|t| e.created_at >= t))
            .filter(|e| query.to_utc.is_none_or(|t| e.created_at <= t))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

// ============================================================================
// Logger
// ============================================================================

/// Fire-and-forget recorder in front of an `AuditStore`.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    enabled: bool,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record one decision. Spawned so the request path never waits on or
    /// fails because of the store; failures go to logs and a counter.
    pub fn record(&self, mut entry: AuditLogEntry, ctx: &AuditContext) {
        if !self.enabled {
            return;
        }

        entry.ip_address = ctx.ip_address.clone();
        entry.user_agent = ctx.user_agent.clone();
        entry.session_id = ctx.session_id.clone();

        let store = self.store.clone();
        tokio::spawn(async move {
            let action = entry.action.clone();
            if let Err(e) = store.append(entry).await {
                counter!("audit_write_failures_total").increment(1);
                tracing::error!(error = %e, action = %action, "Failed to write audit log entry");
            }
        });
    }
}
