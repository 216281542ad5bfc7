//! Marketplace A webhook payloads.
//!
//! Mapping: `product_code` → `product_id`, `available_stock` → `quantity`,
//! `warehouse` → `warehouse_id`, `timestamp` (RFC3339) → `updated_at`,
//! `metadata` → `metadata`.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::common::SyncError;
use crate::domains::inventory::models::{CanonicalRecord, Source};

use super::{optional_object, optional_str, required_i64, required_str, SourceAdapter};

pub struct MarketplaceAAdapter;

impl SourceAdapter for MarketplaceAAdapter {
    fn source(&self) -> Source {
        Source::MarketplaceA
    }

    fn transform(&self, raw: &Value) -> Result<CanonicalRecord, SyncError> {
        let product_id = required_str(raw, "product_code")?.to_string();
        let quantity = required_i64(raw, "available_stock")?;

        let timestamp = required_str(raw, "timestamp")?;
        let updated_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| SyncError::BadPayload("timestamp must be RFC3339".to_string()))?
            .with_timezone(&Utc);

        let record = CanonicalRecord {
            product_id,
            quantity,
            source: Source::MarketplaceA,
            warehouse_id: optional_str(raw, "warehouse"),
            updated_at,
            metadata: optional_object(raw, "metadata"),
        };
        record.validate()?;
        Ok(record)
    }
}
