//! Dish catalog entities and the lenient coercions applied to them.
//!
//! The server is loose about collection-valued fields: `tags` may arrive as
//! a single string, `steps` as one newline-separated block, `ingredients`
//! may be missing entirely. Every dish crossing the remote boundary is
//! materialized into proper sequences here, so the rest of the client never
//! sees the scalar forms.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::api::ApiError;
use crate::utils::url::UrlResolver;

/// A catalog item (recipe) shared by the household.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dish {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "de_tags")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "de_ingredients")]
    pub ingredients: Vec<Ingredient>,
    #[serde(default, deserialize_with = "de_steps")]
    pub steps: Vec<String>,
}

impl Dish {
    /// Rewrite the image URL to fully-qualified form.
    ///
    /// The sequence coercions already happen at deserialization, so this is
    /// the only remaining normalization step. Idempotent: normalizing an
    /// already-normalized dish is a no-op.
    pub fn normalize(&mut self, urls: &UrlResolver) {
        if let Some(ref url) = self.image_url {
            if !url.is_empty() {
                self.image_url = Some(urls.image_url(url));
            }
        }
    }
}

/// One entry in a dish's ingredient list.
///
/// The server accepts freeform entries; a bare string is treated as a name
/// with no amount.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ingredient {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

/// Client-built body for dish create/update.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DishPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
}

impl DishPayload {
    pub(crate) fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Parse the ingredients form field (JSON text) ahead of any network call.
pub fn parse_ingredients_text(text: &str) -> Result<Vec<Ingredient>, ApiError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ApiError::InvalidInput(format!("Ingredients must be a JSON list: {}", e)))?;

    match value {
        Value::Array(_) => Ok(coerce_ingredients(&value)),
        _ => Err(ApiError::InvalidInput(
            "Ingredients must be a JSON list".to_string(),
        )),
    }
}

/// Split a steps form field into trimmed, non-empty lines.
pub fn parse_steps_text(text: &str) -> Vec<String> {
    split_steps_text(text)
}

fn de_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_tags(&value))
}

fn de_ingredients<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Ingredient>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_ingredients(&value))
}

fn de_steps<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_steps(&value))
}

/// A scalar tag is wrapped into a one-element sequence; anything that is
/// not a string or a sequence of strings becomes empty.
fn coerce_tags(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn coerce_ingredients(value: &Value) -> Vec<Ingredient> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(Ingredient {
                name: name.clone(),
                amount: None,
            }),
            Value::Object(_) => serde_json::from_value(item.clone()).ok(),
            _ => None,
        })
        .collect()
}

/// A multi-line scalar splits into trimmed, non-empty lines; sequence items
/// are kept as given.
fn coerce_steps(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => split_steps_text(text),
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn split_steps_text(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
