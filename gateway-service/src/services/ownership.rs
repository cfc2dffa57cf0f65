//! Resource ownership lookups.
//!
//! Ownership checks resolve the recorded owner of `(table, record_id)` and
//! compare it against the caller. Table and column names come from an
//! allow-list baked into the binary; caller input is never interpolated
//! into SQL identifiers.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Tables this gateway is allowed to resolve owners for, with the column
/// that records the owner.
const OWNERSHIP_LOOKUPS: &[(&str, &str)] = &[
    ("student_profiles", "user_id"),
    ("uploads", "owner_id"),
    ("guidance_plans", "student_id"),
];

#[async_trait]
pub trait OwnershipStore: Send + Sync {
    /// Resolve the owner of a record, or `None` when the record does not
    /// exist or the table is not registered for ownership checks.
    async fn owner_of(&self, table: &str, record_id: Uuid) -> Result<Option<Uuid>, anyhow::Error>;
}

pub struct SqlOwnershipStore {
    pool: PgPool,
}

impl SqlOwnershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnershipStore for SqlOwnershipStore {
    async fn owner_of(&self, table: &str, record_id: Uuid) -> Result<Option<Uuid>, anyhow::Error> {
        let Some((table, owner_column)) = OWNERSHIP_LOOKUPS
            .iter()
            .find(|(t, _)| *t == table)
            .copied()
        else {
            tracing::warn!(table = %table, "Ownership lookup against unregistered table");
            return Ok(None);
        };

        // Identifiers come from the allow-list above, never from the caller.
        let sql = format!("SELECT {} FROM {} WHERE id = $1", owner_column, table);
        let row = sqlx::query(&sql)
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<Uuid, _>(0)))
    }
}

/// In-memory ownership table for tests and single-node dev.
#[derive(Default)]
pub struct MemoryOwnershipStore {
    records: DashMap<(String, Uuid), Uuid>,
}

impl MemoryOwnershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: &str, record_id: Uuid, owner_id: Uuid) {
        self.records.insert((table.to_string(), record_id), owner_id);
    }
}

#[async_trait]
impl OwnershipStore for MemoryOwnershipStore {
    async fn owner_of(&self, table: &str, record_id: Uuid) -> Result<Option<Uuid>, anyhow::Error> {
        Ok(self
            .records
            .get(&(table.to_string(), record_id))
            .map(|r| *r.value()))
    }
}
