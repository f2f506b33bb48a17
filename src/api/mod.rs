//! REST API client module for the Dayly backend.
//!
//! This module provides the `ApiClient` for talking to the Dayly API,
//! the typed `ApiError` taxonomy, and the advisory `Connectivity` flag
//! the sync engine consults before attempting a refresh.
//!
//! The API uses JWT bearer token authentication; the token is obtained
//! by the host's login flow and injected via `ApiClient::set_token`.

pub mod client;
pub mod connectivity;
pub mod error;

pub use client::ApiClient;
pub use connectivity::Connectivity;
pub use error::ApiError;
