//! Progressive photo download.

pub mod progressive;

pub use progressive::{FetchError, ProgressiveFetcher, DEFAULT_MAX_ATTEMPTS};
