//! Shared async services

mod store;

pub use store::SyncStore;
