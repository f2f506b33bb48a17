//! Tiered photo cache.
//!
//! Memory tier: LRU, bounded by entry count and decoded cost.
//! Disk tier: one JPEG per photo id, TTL-bounded, authoritative for
//! "is this photo cached".

pub mod manager;
pub mod memory;

pub use manager::{CacheError, PhotoCache};
pub use memory::MemoryCache;
