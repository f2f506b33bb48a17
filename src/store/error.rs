use thiserror::Error;

/// Storage failures are correctness problems, not environmental ones, and
/// always surface to the caller as typed errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(#[source] rusqlite::Error),

    #[error("Failed to create store directory: {0}")]
    Io(#[source] std::io::Error),

    #[error("Failed to read from store: {0}")]
    Fetch(#[source] rusqlite::Error),

    #[error("Failed to write to store: {0}")]
    Save(#[source] rusqlite::Error),
}
