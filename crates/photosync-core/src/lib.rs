//! photosync-core - Core library for PhotoSync
//!
//! Encrypted photo backup to a self-hosted server: device key store, hybrid
//! RSA/AES payload codec, the durable sync record store, reconciliation of
//! device media and server inventory, and the single-flight upload pipeline.

pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod error;
pub mod keystore;
pub mod media;
pub mod models;
pub mod reconcile;
pub mod services;
pub mod session;
pub mod upload;
pub mod util;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use engine::{Engine, ReconciliationSummary};
pub use error::{Error, Result};
pub use models::{RecordId, SyncRecord, SyncStatus};
