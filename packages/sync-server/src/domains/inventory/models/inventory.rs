//! Persisted inventory state and the transactional upsert.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::common::SyncError;

use super::canonical::{CanonicalRecord, Source};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InventoryRow {
    pub id: Uuid,
    pub product_id: String,
    pub quantity: i64,
    pub source: Source,
    pub warehouse_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

impl InventoryRow {
    /// Upsert a canonical record and append the audit row, in one transaction.
    ///
    /// Steps, in order:
    /// 1. Reserve the existing `(product_id, source)` row with `FOR UPDATE`,
    ///    serializing with any writer that slipped past the distributed lock.
    /// 2. Read the old quantity (NULL when this is the first insert).
    /// 3. Insert-or-update unconditionally; ordering is the lock manager's
    ///    job, so there is no last-write-wins timestamp comparison here.
    /// 4. Append the audit row with the old and new quantities.
    /// 5. Commit. Any error rolls the whole set back.
    ///
    /// Replaying an identical record is safe: it rewrites the same state and
    /// appends an audit row whose old and new quantities are equal.
    pub async fn upsert_record(
        record: &CanonicalRecord,
        pool: &PgPool,
    ) -> Result<Self, SyncError> {
        record.validate()?;

        let mut tx = pool.begin().await.map_err(SyncError::storage)?;

        let old_quantity: Option<i64> = sqlx::query_scalar(
            "SELECT quantity FROM inventory WHERE product_id = $1 AND source = $2 FOR UPDATE",
        )
        .bind(&record.product_id)
        .bind(record.source)
        .fetch_optional(&mut *tx)
        .await
        .map_err(SyncError::storage)?;

        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO inventory (id, product_id, quantity, source, warehouse_id, updated_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (product_id, source) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                warehouse_id = EXCLUDED.warehouse_id,
                updated_at = EXCLUDED.updated_at,
                metadata = EXCLUDED.metadata
            RETURNING id, product_id, quantity, source, warehouse_id, updated_at, created_at, metadata
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.product_id)
        .bind(record.quantity)
        .bind(record.source)
        .bind(&record.warehouse_id)
        .bind(record.updated_at)
        .bind(&record.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(SyncError::storage)?;

        sqlx::query(
            r#"
            INSERT INTO inventory_audit (id, product_id, old_quantity, new_quantity, source, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.product_id)
        .bind(old_quantity)
        .bind(record.quantity)
        .bind(record.source)
        .bind(record.audit_metadata())
        .execute(&mut *tx)
        .await
        .map_err(SyncError::storage)?;

        tx.commit().await.map_err(SyncError::storage)?;

        Ok(row)
    }

    /// All rows for a product, one per source.
    pub async fn find_by_product(
        product_id: &str,
        pool: &PgPool,
    ) -> Result<Vec<Self>, SyncError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, product_id, quantity, source, warehouse_id, updated_at, created_at, metadata
            FROM inventory
            WHERE product_id = $1
            ORDER BY source
            "#,
        )
        .bind(product_id)
        .fetch_all(pool)
        .await
        .map_err(SyncError::storage)
    }
}
