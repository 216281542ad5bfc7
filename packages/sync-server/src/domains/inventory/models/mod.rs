mod audit;
mod canonical;
mod inventory;

pub use audit::AuditRow;
pub use canonical::{CanonicalRecord, Source};
pub use inventory::InventoryRow;
