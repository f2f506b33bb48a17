//! Reconciliation engine.
//!
//! Merges the remote-authoritative group/photo collections into the local
//! persistent store, and serves reads local-first so the app stays usable
//! offline.

pub mod engine;

pub use engine::{SyncEngine, SyncError};
