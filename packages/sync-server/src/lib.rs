// Unified Inventory Synchronizer - Core
//
// Ingests inventory updates from heterogeneous marketplace sources (webhooks
// and polled APIs), normalizes them to a canonical record, and commits them
// to Postgres with per-product distributed locking, at-least-once delivery,
// and bounded retry.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
