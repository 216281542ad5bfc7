//! Audit trail reads. Writes happen inside the upsert transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::common::SyncError;

use super::canonical::Source;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditRow {
    pub id: Uuid,
    pub product_id: String,
    pub old_quantity: Option<i64>,
    pub new_quantity: i64,
    pub source: Source,
    pub changed_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

impl AuditRow {
    pub const DEFAULT_LIMIT: i64 = 50;

    /// Most recent transitions for a product, newest first.
    pub async fn find_by_product(
        product_id: &str,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>, SyncError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, product_id, old_quantity, new_quantity, source, changed_at, metadata
            FROM inventory_audit
            WHERE product_id = $1
            ORDER BY changed_at DESC
            LIMIT $2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(SyncError::storage)
    }
}
