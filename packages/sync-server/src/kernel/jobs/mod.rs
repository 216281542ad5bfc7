//! Job infrastructure for the update pipeline.
//!
//! ```text
//! Ingestion (webhook / poller)
//!     │
//!     └─► JobQueue.add / add_batch ──► waiting
//!
//! SyncWorker
//!     │
//!     ├─► claim (lease)            ──► active
//!     ├─► LockManager.with_lock(product_id)
//!     │       └─► InventoryRow.upsert_record
//!     ├─► ack                      ──► completed
//!     └─► fail                     ──► delayed (backoff) | failed
//! ```

pub mod events;
mod job;
mod queue;
mod worker;

pub use events::JobEvent;
pub use job::{JobState, SyncJob, BACKOFF_BASE_MS, DEFAULT_MAX_ATTEMPTS};
pub use queue::{JobQueue, QueueStats, RedisJobQueue};
pub use worker::{SyncWorker, WorkerConfig};
