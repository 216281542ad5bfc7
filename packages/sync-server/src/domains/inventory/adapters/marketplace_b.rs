//! Marketplace B polled payloads.
//!
//! Mapping: `sku` → `product_id`, `qty` → `quantity`, `location_id` →
//! `warehouse_id`, `last_modified` (Unix seconds) → `updated_at`,
//! `additional_info` → `metadata`.

use chrono::DateTime;
use serde_json::Value;

use crate::common::SyncError;
use crate::domains::inventory::models::{CanonicalRecord, Source};

use super::{optional_object, optional_str, required_i64, required_str, SourceAdapter};

pub struct MarketplaceBAdapter;

impl SourceAdapter for MarketplaceBAdapter {
    fn source(&self) -> Source {
        Source::MarketplaceB
    }

    fn transform(&self, raw: &Value) -> Result<CanonicalRecord, SyncError> {
        let product_id = required_str(raw, "sku")?.to_string();
        let quantity = required_i64(raw, "qty")?;

        let last_modified = required_i64(raw, "last_modified")?;
        let updated_at = DateTime::from_timestamp(last_modified, 0)
            .ok_or_else(|| SyncError::BadPayload("last_modified out of range".to_string()))?;

        let record = CanonicalRecord {
            product_id,
            quantity,
            source: Source::MarketplaceB,
            warehouse_id: optional_str(raw, "location_id"),
            updated_at,
            metadata: optional_object(raw, "additional_info"),
        };
        record.validate()?;
        Ok(record)
    }
}
