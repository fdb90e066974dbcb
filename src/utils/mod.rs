//! Utility functions shared across the client.

pub mod url;

pub use url::{parse_origin, UrlResolver};
