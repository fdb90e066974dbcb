use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// An operation was called without the id it requires. Fails before any I/O.
    #[error("Missing {0} id")]
    MissingId(&'static str),

    /// Locally-supplied input could not be parsed. Fails before any network call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized - session expired")]
    Unauthorized,

    /// A 4xx/5xx business error, carrying the message extracted from the body.
    #[error("{0}")]
    Remote(String),

    /// The network itself failed before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// The server responded with a 2xx but the body was not in the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data in errors
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    /// Classify a non-2xx response by status code and body.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return ApiError::Unauthorized;
        }

        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|data| extract_error_message(&data))
            .unwrap_or_else(|| Self::truncate_body(body));

        if message.is_empty() {
            ApiError::Remote(format!("Server error ({})", status))
        } else {
            ApiError::Remote(message)
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Pull a human-readable message out of an error response body.
///
/// The server reports failures either as `{ "error": "..." }` or as a
/// validation list `{ "errors": [{ "msg": "..." }, ...] }`.
pub fn extract_error_message(data: &serde_json::Value) -> Option<String> {
    if let Some(s) = data.as_str() {
        return Some(s.to_string());
    }
    if let Some(msg) = data.get("error").and_then(|e| e.as_str()) {
        return Some(msg.to_string());
    }
    data.get("errors")
        .and_then(|e| e.as_array())
        .and_then(|errors| errors.first())
        .and_then(|first| first.get("msg"))
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}
