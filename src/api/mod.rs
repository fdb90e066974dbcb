//! Transport layer for the meal-planning server API.
//!
//! This module provides the `Transport` trait the caches talk through,
//! the reqwest-backed `HttpTransport`, and the classified `ApiError`
//! taxonomy every operation fails with.
//!
//! The API uses JWT bearer token authentication; the token lives in the
//! shared key-value store and a 401 clears it and triggers the app's
//! redirect-to-login hook.

pub mod error;
pub mod transport;

pub use error::{extract_error_message, ApiError};
pub use transport::{flatten_form_fields, HttpTransport, Method, Transport};
