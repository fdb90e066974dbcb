//! Account session for the meal-planning server.
//!
//! The bearer token and signed-in user live in the shared key-value
//! store, where the transport reads the token on every request and
//! clears it on a 401. This session object mirrors that state in memory
//! and owns the login/register/profile operations.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::api::{ApiError, Method, Transport};
use crate::cache::KvStore;
use crate::models::User;

/// Store key holding the bearer token.
pub const TOKEN_KEY: &str = "token";

/// Store key holding the signed-in user.
pub const CURRENT_USER_KEY: &str = "currentUser";

/// Body of a login/register response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// Session status after [`AuthSession::init`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user: Option<User>,
}

#[derive(Default)]
struct SessionState {
    token: String,
    user: Option<User>,
}

pub struct AuthSession {
    transport: Arc<dyn Transport>,
    store: Arc<dyn KvStore>,
    state: Mutex<SessionState>,
}

impl AuthSession {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn KvStore>) -> Self {
        Self {
            transport,
            store,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Hydrate the in-memory session from the store, then validate any
    /// stored token against the server. A rejected token clears the
    /// stored session.
    pub async fn init(&self) -> AuthState {
        self.load_from_store();

        if self.token().is_empty() {
            return AuthState {
                is_authenticated: false,
                user: None,
            };
        }

        match self.fetch_me().await {
            Ok(user) => AuthState {
                is_authenticated: true,
                user: user.or_else(|| self.current_user()),
            },
            Err(e) => {
                debug!(error = %e, "Stored session rejected, clearing");
                self.clear();
                AuthState {
                    is_authenticated: false,
                    user: None,
                }
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let value = self
            .transport
            .send(
                "/auth/login",
                Method::Post,
                &[],
                Some(json!({ "username": username, "password": password })),
            )
            .await?;

        let auth: AuthResponse = serde_json::from_value(value).unwrap_or_default();

        let mut state = self.state();
        if let Some(ref token) = auth.token {
            state.token = token.clone();
        }
        if let Some(ref user) = auth.user {
            state.user = Some(user.clone());
        }
        self.persist(&state);

        Ok(auth)
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, username: &str, password: &str) -> Result<Value, ApiError> {
        self.transport
            .send(
                "/auth/register",
                Method::Post,
                &[],
                Some(json!({ "username": username, "password": password })),
            )
            .await
    }

    /// Refresh the signed-in user from the server.
    pub async fn fetch_me(&self) -> Result<Option<User>, ApiError> {
        let value = self.transport.send("/auth/me", Method::Get, &[], None).await?;
        Ok(self.absorb_user(value))
    }

    pub async fn update_profile(&self, display_name: &str) -> Result<Option<User>, ApiError> {
        let value = self
            .transport
            .send(
                "/auth/profile",
                Method::Put,
                &[],
                Some(json!({ "displayName": display_name })),
            )
            .await?;
        Ok(self.absorb_user(value))
    }

    pub async fn upload_avatar(&self, file: &Path) -> Result<Option<User>, ApiError> {
        let value = self
            .transport
            .upload("/auth/avatar", file, "avatar", &Map::new())
            .await?;
        Ok(self.absorb_user(value))
    }

    /// Drop the in-memory and stored session.
    pub fn clear(&self) {
        let mut state = self.state();
        state.token.clear();
        state.user = None;

        if let Err(e) = self.store.remove(TOKEN_KEY) {
            debug!(error = %e, "Failed to clear stored token");
        }
        if let Err(e) = self.store.remove(CURRENT_USER_KEY) {
            debug!(error = %e, "Failed to clear stored user");
        }
    }

    pub fn token(&self) -> String {
        self.state().token.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state().user.clone()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load_from_store(&self) {
        let mut state = self.state();
        state.token = self
            .store
            .get(TOKEN_KEY)
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();
        state.user = self
            .store
            .get(CURRENT_USER_KEY)
            .and_then(|v| serde_json::from_value(v).ok());
    }

    /// Pull the `user` out of a response body, updating memory and store
    /// when one is present.
    fn absorb_user(&self, value: Value) -> Option<User> {
        let auth: AuthResponse = serde_json::from_value(value).unwrap_or_default();
        if let Some(ref user) = auth.user {
            let mut state = self.state();
            state.user = Some(user.clone());
            self.persist(&state);
        }
        auth.user
    }

    fn persist(&self, state: &SessionState) {
        if let Err(e) = self.store.set(TOKEN_KEY, &Value::String(state.token.clone())) {
            debug!(error = %e, "Failed to persist token");
        }
        match serde_json::to_value(&state.user) {
            Ok(value) => {
                if let Err(e) = self.store.set(CURRENT_USER_KEY, &value) {
                    debug!(error = %e, "Failed to persist user");
                }
            }
            Err(e) => debug!(error = %e, "Failed to serialize user"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::testing::MockTransport;
    use crate::cache::MemoryStore;

    fn session() -> (Arc<MockTransport>, Arc<MemoryStore>, AuthSession) {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        let auth = AuthSession::new(transport.clone(), store.clone());
        (transport, store, auth)
    }

    #[tokio::test]
    async fn test_login_persists_token_and_user() {
        let (transport, store, auth) = session();
        transport.push_ok(json!({
            "token": "t1",
            "user": { "_id": "u1", "username": "mom", "displayName": "Mom" }
        }));

        let response = auth.login("mom", "secret").await.expect("login");
        assert_eq!(response.token.as_deref(), Some("t1"));
        assert_eq!(auth.token(), "t1");
        assert_eq!(auth.current_user().expect("user").username, "mom");
        assert_eq!(store.get(TOKEN_KEY), Some(json!("t1")));
        assert_eq!(store.get(CURRENT_USER_KEY).expect("stored")["username"], json!("mom"));
    }

    #[tokio::test]
    async fn test_init_without_token_skips_network() {
        let (transport, _, auth) = session();
        let state = auth.init().await;
        assert!(!state.is_authenticated);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_init_validates_stored_token() {
        let (transport, store, auth) = session();
        store.set(TOKEN_KEY, &json!("t1")).expect("seed token");
        transport.push_ok(json!({ "user": { "username": "mom" } }));

        let state = auth.init().await;
        assert!(state.is_authenticated);
        assert_eq!(state.user.expect("user").username, "mom");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_init_clears_rejected_session() {
        let (transport, store, auth) = session();
        store.set(TOKEN_KEY, &json!("stale")).expect("seed token");
        store
            .set(CURRENT_USER_KEY, &json!({ "username": "mom" }))
            .expect("seed user");
        transport.push_err(ApiError::Unauthorized);

        let state = auth.init().await;
        assert!(!state.is_authenticated);
        assert!(auth.token().is_empty());
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(store.get(CURRENT_USER_KEY).is_none());
    }

    #[tokio::test]
    async fn test_update_profile_refreshes_user() {
        let (transport, _, auth) = session();
        transport.push_ok(json!({ "user": { "username": "mom", "displayName": "Chef Mom" } }));

        let user = auth.update_profile("Chef Mom").await.expect("update");
        assert_eq!(user.expect("user").display_name.as_deref(), Some("Chef Mom"));
        assert_eq!(
            auth.current_user().expect("user").display_name.as_deref(),
            Some("Chef Mom")
        );
    }

    #[tokio::test]
    async fn test_register_does_not_change_session() {
        let (transport, store, auth) = session();
        transport.push_ok(json!({ "ok": true }));

        auth.register("kid", "pw").await.expect("register");
        assert!(auth.token().is_empty());
        assert!(store.get(TOKEN_KEY).is_none());
    }
}
