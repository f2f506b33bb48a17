//! Local persistent store.
//!
//! A single SQLite database holds groups, their members, and photo
//! metadata. Reads are cheap point/range queries; all mutation happens
//! inside explicit transactions so reconciliation is all-or-nothing.

pub mod error;
pub mod sqlite;

pub use error::StoreError;
pub use sqlite::{Store, StoreTx};
