//! Authentication module for managing the account session and credentials.
//!
//! This module provides:
//! - `AuthSession`: token-based session over the shared key-value store
//! - `CredentialStore`: secure OS-level remember-me storage via keyring
//!
//! The bearer token is persisted under the `token` key where the
//! transport picks it up; a 401 anywhere clears it.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{AuthResponse, AuthSession, AuthState, CURRENT_USER_KEY, TOKEN_KEY};
