//! Canonical inventory record.
//!
//! All sources normalize into this shape before anything touches the queue
//! or the database. `updated_at` is the source's timestamp, never ingestion
//! time.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::SyncError;

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "inventory_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Source {
    MarketplaceA,
    MarketplaceB,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::MarketplaceA => "marketplace_a",
            Source::MarketplaceB => "marketplace_b",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub product_id: String,
    pub quantity: i64,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CanonicalRecord {
    /// Structural and range checks on the canonical schema.
    ///
    /// Failures are `BadPayload`: terminal at the worker, 400 at the webhook.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.product_id.trim().is_empty() {
            return Err(SyncError::BadPayload(
                "product_id must not be empty".to_string(),
            ));
        }
        if self.quantity < 0 {
            return Err(SyncError::BadPayload(
                "quantity must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Metadata written to the audit row: source metadata merged with the
    /// warehouse id.
    pub fn audit_metadata(&self) -> Value {
        let mut map = match &self.metadata {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        if let Some(warehouse_id) = &self.warehouse_id {
            map.insert(
                "warehouse_id".to_string(),
                Value::String(warehouse_id.clone()),
            );
        }
        Value::Object(map)
    }
}
