use serde::{Deserialize, Serialize};

use crate::utils::url::UrlResolver;

/// An account on the household's meal-planning server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "avatarUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl User {
    /// Display label: the display name, falling back to the username.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.username)
    }

    /// The avatar URL in fully-qualified form.
    pub fn avatar_resolved(&self, urls: &UrlResolver) -> Option<String> {
        self.avatar_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| urls.image_url(u))
    }
}
