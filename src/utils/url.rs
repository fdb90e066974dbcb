//! URL resolution for API paths and uploaded images.
//!
//! The server exposes two kinds of relative URLs: API paths that resolve
//! against the configured base API URL, and `/api/...` or `/uploads/...`
//! paths that resolve against the server origin (scheme + host + port).
//! Absolute `http(s)://` URLs always pass through unchanged.

/// Resolves logical paths and image URLs against a configured base API URL.
///
/// Clone is cheap - two small strings.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    base: String,
    origin: String,
}

impl UrlResolver {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.to_string(),
            origin: parse_origin(base_url),
        }
    }

    /// The configured base API URL, e.g. `http://host:8081/api`.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The origin of the base API URL, e.g. `http://host:8081`.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Resolve a logical API path to a full URL.
    ///
    /// `/api/...` paths resolve against the origin, every other relative
    /// path resolves against the base API URL. Absolute URLs pass through.
    pub fn api_url(&self, path_or_url: &str) -> String {
        if path_or_url.is_empty() {
            return self.base.clone();
        }
        if is_absolute_url(path_or_url) {
            return path_or_url.to_string();
        }

        let p = ensure_leading_slash(path_or_url);
        if p.starts_with("/api/") {
            join_base_and_path(&self.origin, &p)
        } else {
            join_base_and_path(&self.base, &p)
        }
    }

    /// Resolve an image or avatar URL to a fully-qualified form.
    ///
    /// Relative URLs (`/uploads/...`, `/api/uploads/...`, and anything else
    /// the server hands back) resolve against the origin.
    pub fn image_url(&self, url: &str) -> String {
        if url.is_empty() {
            return String::new();
        }
        if is_absolute_url(url) {
            return url.to_string();
        }

        let p = ensure_leading_slash(url);
        join_base_and_path(&self.origin, &p)
    }
}

/// Extract the origin (scheme + host + port) from a base URL.
///
/// Returns an empty string when the input does not start with `http://`
/// or `https://`.
pub fn parse_origin(base_url: &str) -> String {
    let lower = base_url.to_ascii_lowercase();
    let scheme_len = if lower.starts_with("https://") {
        "https://".len()
    } else if lower.starts_with("http://") {
        "http://".len()
    } else {
        return String::new();
    };

    let rest = &base_url[scheme_len..];
    if rest.is_empty() {
        return String::new();
    }
    let host_end = rest.find('/').unwrap_or(rest.len());
    if host_end == 0 {
        return String::new();
    }
    base_url[..scheme_len + host_end].to_string()
}

fn is_absolute_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn ensure_leading_slash(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn join_base_and_path(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    let clean_base = base.strip_suffix('/').unwrap_or(base);
    format!("{}{}", clean_base, path)
}
