//! Display formatting helpers.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{format_bytes, format_date};
