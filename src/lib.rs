//! Client core for Dayly, a one-photo-a-day group sharing app.
//!
//! The crate is local-first: reads come from a SQLite snapshot that a
//! reconciliation engine keeps aligned with the remote API whenever
//! connectivity allows, and photo images move through a tiered cache
//! (bounded memory LRU over a TTL-swept disk directory) fed by a
//! progressive, retrying downloader.
//!
//! [`Dayly`] is the embedder-facing facade; the modules underneath are
//! usable on their own for finer-grained wiring.

pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod models;
pub mod store;
pub mod sync;
pub mod utils;

pub use api::{ApiClient, ApiError, Connectivity};
pub use app::Dayly;
pub use cache::{CacheError, PhotoCache};
pub use config::Config;
pub use fetch::{FetchError, ProgressiveFetcher};
pub use models::{Group, GroupMember, Photo};
pub use store::{Store, StoreError};
pub use sync::{SyncEngine, SyncError};
