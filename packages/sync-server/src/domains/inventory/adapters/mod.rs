//! Per-source payload adapters.
//!
//! Each marketplace speaks its own JSON dialect; an adapter is a pure,
//! stateless function from that dialect to the canonical record. Routing
//! happens upstream (URL path for webhooks, cron task for the poller), so
//! adapters never inspect anything but the payload itself.

mod marketplace_a;
mod marketplace_b;

pub use marketplace_a::MarketplaceAAdapter;
pub use marketplace_b::MarketplaceBAdapter;

use serde_json::Value;

use crate::common::SyncError;
use crate::domains::inventory::models::{CanonicalRecord, Source};

pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Normalize one raw payload. Missing fields, wrong types, and negative
    /// quantities fail with `BadPayload`.
    fn transform(&self, raw: &Value) -> Result<CanonicalRecord, SyncError>;

    /// Normalize a batch, dropping and logging individual failures.
    /// The batch itself never fails.
    fn transform_batch(&self, items: &[Value]) -> Vec<CanonicalRecord> {
        items
            .iter()
            .filter_map(|raw| match self.transform(raw) {
                Ok(record) => Some(record),
                Err(error) => {
                    tracing::warn!(
                        source = %self.source(),
                        %error,
                        "dropping payload that failed normalization"
                    );
                    None
                }
            })
            .collect()
    }
}

pub(super) fn required_str<'a>(raw: &'a Value, field: &str) -> Result<&'a str, SyncError> {
    raw.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SyncError::BadPayload(format!("{field} must be a non-empty string")))
}

pub(super) fn required_i64(raw: &Value, field: &str) -> Result<i64, SyncError> {
    raw.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| SyncError::BadPayload(format!("{field} must be an integer")))
}

pub(super) fn optional_str(raw: &Value, field: &str) -> Option<String> {
    raw.get(field).and_then(Value::as_str).map(str::to_string)
}

pub(super) fn optional_object(raw: &Value, field: &str) -> Option<Value> {
    raw.get(field).filter(|v| !v.is_null()).cloned()
}
