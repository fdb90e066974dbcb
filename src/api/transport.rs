//! Transport layer for the meal-planning API.
//!
//! The caches talk to the server exclusively through the [`Transport`]
//! trait: a request/response exchange plus a multipart file upload. The
//! production implementation is [`HttpTransport`] (reqwest); tests inject
//! a recording mock.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::auth::{CURRENT_USER_KEY, TOKEN_KEY};
use crate::cache::KvStore;
use crate::utils::url::UrlResolver;

use super::ApiError;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Request/response exchange with the meal-planning server.
///
/// `send` carries an optional JSON body; `upload` submits one file plus
/// extra form fields as multipart (always POST, matching the server's
/// upload endpoints). Both classify failures as [`ApiError`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        path: &str,
        method: Method,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError>;

    async fn upload(
        &self,
        path: &str,
        file: &Path,
        field_name: &str,
        fields: &Map<String, Value>,
    ) -> Result<Value, ApiError>;
}

/// Serialize form field values to the scalar forms the server expects.
///
/// Array values are flattened before transport: `steps` is newline-joined,
/// every other array (tags, ingredients) becomes JSON text. Scalars pass
/// through as their string form.
pub fn flatten_form_fields(fields: &Map<String, Value>) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::Array(items) if key == "steps" => items
                    .iter()
                    .map(value_text)
                    .collect::<Vec<_>>()
                    .join("\n"),
                Value::Array(_) => value.to_string(),
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// reqwest-backed transport.
///
/// Reads the bearer token from the shared key-value store on every request,
/// so a login in one component is immediately visible here. On a 401 the
/// stored session is cleared and the injected hook (the app's
/// redirect-to-login) runs before the error propagates.
pub struct HttpTransport {
    client: Client,
    urls: UrlResolver,
    store: Arc<dyn KvStore>,
    on_unauthorized: Option<Box<dyn Fn() + Send + Sync>>,
}

impl HttpTransport {
    pub fn new(urls: UrlResolver, store: Arc<dyn KvStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            urls,
            store,
            on_unauthorized: None,
        })
    }

    /// Install the hook invoked after a 401 clears the stored session.
    pub fn with_unauthorized_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Box::new(hook));
        self
    }

    fn token(&self) -> Option<String> {
        self.store
            .get(TOKEN_KEY)
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .filter(|t| !t.is_empty())
    }

    fn handle_unauthorized(&self) {
        warn!("Session expired, clearing stored credentials");
        if let Err(e) = self.store.remove(TOKEN_KEY) {
            debug!(error = %e, "Failed to clear stored token");
        }
        if let Err(e) = self.store.remove(CURRENT_USER_KEY) {
            debug!(error = %e, "Failed to clear stored user");
        }
        if let Some(ref hook) = self.on_unauthorized {
            hook();
        }
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();

        if status.as_u16() == 401 {
            self.handle_unauthorized();
            return Err(ApiError::Unauthorized);
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &text));
        }

        Ok(parse_body(&text))
    }
}

/// Parse a response body as JSON, falling back to the raw text.
fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        path: &str,
        method: Method,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = self.urls.api_url(path);
        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut request = self.client.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn upload(
        &self,
        path: &str,
        file: &Path,
        field_name: &str,
        fields: &Map<String, Value>,
    ) -> Result<Value, ApiError> {
        let url = self.urls.api_url(path);

        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| ApiError::InvalidInput(format!("Failed to read upload file: {}", e)))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut form = reqwest::multipart::Form::new();
        for (key, text) in flatten_form_fields(fields) {
            form = form.text(key, text);
        }
        form = form.part(
            field_name.to_string(),
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        );

        let mut request = self.client.post(&url).multipart(form);
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        self.handle_response(response).await
    }
}
