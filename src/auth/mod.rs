//! Persisted sign-in session.

pub mod session;

pub use session::{Session, SessionData};
