//! The dish catalog cache.
//!
//! Owns the full dish collection, an id index over it, and a "fully
//! loaded" flag. All reads and writes of dish data go through here: pages
//! render instantly from local state, the server stays the single source
//! of truth, and every mutation lands in the in-memory index and the
//! persisted copy in one step.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::api::{ApiError, Method, Transport};
use crate::models::{Dish, DishPayload};
use crate::utils::url::UrlResolver;

use super::KvStore;

/// Persistence key holding the full dish collection.
const DISHES_KEY: &str = "dishes:all";

/// Persistence key holding the time of the last collection write.
const DISHES_TS_KEY: &str = "dishes:all:ts";

/// Optional query filters for a read-through dish listing.
#[derive(Debug, Clone, Default)]
pub struct DishFilter {
    pub search: Option<String>,
    pub tag: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl DishFilter {
    fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(ref search) = self.search {
            query.push(("search".to_string(), search.clone()));
        }
        if let Some(ref tag) = self.tag {
            query.push(("tag".to_string(), tag.clone()));
        }
        if let Some(ref category) = self.category {
            query.push(("category".to_string(), category.clone()));
        }
        if let Some(ref subcategory) = self.subcategory {
            query.push(("subcategory".to_string(), subcategory.clone()));
        }
        if let Some(page) = self.page {
            query.push(("page".to_string(), page.to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        query
    }
}

/// One page of a filtered listing: the normalized dishes plus the raw
/// response for callers that need pagination metadata.
#[derive(Debug, Clone)]
pub struct DishPage {
    pub raw: Value,
    pub list: Vec<Dish>,
}

#[derive(Default)]
struct CatalogState {
    dishes: Vec<Dish>,
    by_id: HashMap<String, usize>,
    fully_loaded: bool,
}

impl CatalogState {
    /// `by_id` is always exactly the index of `dishes` restricted to
    /// entries with a non-empty id.
    fn rebuild_index(&mut self) {
        self.by_id.clear();
        for (idx, dish) in self.dishes.iter().enumerate() {
            if !dish.id.is_empty() {
                self.by_id.insert(dish.id.clone(), idx);
            }
        }
    }
}

pub struct CatalogCache {
    transport: Arc<dyn Transport>,
    store: Arc<dyn KvStore>,
    urls: UrlResolver,
    state: Mutex<CatalogState>,
}

impl CatalogCache {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn KvStore>, urls: UrlResolver) -> Self {
        Self {
            transport,
            store,
            urls,
            state: Mutex::new(CatalogState::default()),
        }
    }

    /// Return the catalog, fetching at most once per cold start.
    ///
    /// Resolution order: in-memory state, then the persisted copy (a
    /// non-empty persisted collection counts as fully loaded), then one
    /// remote fetch.
    pub async fn ensure_loaded(&self) -> Result<Vec<Dish>, ApiError> {
        {
            let state = self.state();
            if state.fully_loaded && !state.dishes.is_empty() {
                return Ok(state.dishes.clone());
            }
        }

        if let Some(value) = self.store.get(DISHES_KEY) {
            match serde_json::from_value::<Vec<Dish>>(value) {
                Ok(dishes) if !dishes.is_empty() => {
                    let mut state = self.state();
                    state.dishes = dishes;
                    state.fully_loaded = true;
                    state.rebuild_index();
                    return Ok(state.dishes.clone());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Ignoring unreadable persisted catalog"),
            }
        }

        self.fetch_all().await
    }

    /// Unconditional remote refetch; replaces the whole collection.
    pub async fn fetch_all(&self) -> Result<Vec<Dish>, ApiError> {
        let value = self.transport.send("/meals", Method::Get, &[], None).await?;
        let dishes = self.parse_dish_list(&value);

        let mut state = self.state();
        state.dishes = dishes;
        state.fully_loaded = true;
        state.rebuild_index();
        self.persist(&state);
        Ok(state.dishes.clone())
    }

    /// Remote query with filters. Read-through: results are normalized but
    /// never indexed, since a filtered page is a partial view.
    pub async fn fetch_list(&self, filter: &DishFilter) -> Result<DishPage, ApiError> {
        let value = self
            .transport
            .send("/meals", Method::Get, &filter.to_query(), None)
            .await?;
        let list = self.parse_dish_list(&value);
        Ok(DishPage { raw: value, list })
    }

    /// Fetch one dish and upsert it into the cache.
    pub async fn fetch_by_id(&self, id: &str) -> Result<Dish, ApiError> {
        if id.is_empty() {
            return Err(ApiError::MissingId("dish"));
        }

        let value = self
            .transport
            .send(&format!("/meals/{}", id), Method::Get, &[], None)
            .await?;
        let dish = self.parse_dish(value)?;
        self.commit_upsert(dish.clone(), false);
        Ok(dish)
    }

    /// Create a dish, optionally with an attached image.
    ///
    /// With an image the payload goes up as a multipart upload (the
    /// transport flattens array fields); otherwise as plain JSON. The
    /// created dish is inserted at the front of the collection.
    pub async fn create(
        &self,
        payload: &DishPayload,
        image: Option<&Path>,
    ) -> Result<Dish, ApiError> {
        let value = match image {
            Some(file) => {
                self.transport
                    .upload("/meals", file, "image", &payload.to_map())
                    .await?
            }
            None => {
                self.transport
                    .send("/meals", Method::Post, &[], Some(Value::Object(payload.to_map())))
                    .await?
            }
        };

        let dish = self.parse_dish(value)?;
        self.commit_upsert(dish.clone(), true);
        Ok(dish)
    }

    /// Update a dish, optionally replacing its image.
    pub async fn update(
        &self,
        id: &str,
        payload: &DishPayload,
        image: Option<&Path>,
    ) -> Result<Dish, ApiError> {
        if id.is_empty() {
            return Err(ApiError::MissingId("dish"));
        }

        let path = format!("/meals/{}", id);
        let value = match image {
            Some(file) => {
                self.transport
                    .upload(&path, file, "image", &payload.to_map())
                    .await?
            }
            None => {
                self.transport
                    .send(&path, Method::Put, &[], Some(Value::Object(payload.to_map())))
                    .await?
            }
        };

        let dish = self.parse_dish(value)?;
        self.commit_upsert(dish.clone(), true);
        Ok(dish)
    }

    /// Delete a dish remotely, then drop it from the collection and index.
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        if id.is_empty() {
            return Err(ApiError::MissingId("dish"));
        }

        self.transport
            .send(&format!("/meals/{}", id), Method::Delete, &[], None)
            .await?;

        let mut state = self.state();
        state.dishes.retain(|d| d.id != id);
        state.rebuild_index();
        self.persist(&state);
        Ok(())
    }

    /// Pure index read, no I/O.
    pub fn lookup(&self, id: &str) -> Option<Dish> {
        if id.is_empty() {
            return None;
        }
        let state = self.state();
        state
            .by_id
            .get(id)
            .and_then(|&idx| state.dishes.get(idx))
            .cloned()
    }

    /// The dish name for an id, or empty when the dish is not resident.
    pub fn lookup_name(&self, id: &str) -> String {
        self.lookup(id).map(|d| d.name).unwrap_or_default()
    }

    pub fn all(&self) -> Vec<Dish> {
        self.state().dishes.clone()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.state().fully_loaded
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply an insert-or-replace, then recompute the index and persist.
    ///
    /// Every mutating operation funnels through here (or through the
    /// equivalent block in `fetch_all`/`delete`), so the index invariant
    /// is never observable as violated between operations.
    fn commit_upsert(&self, dish: Dish, mark_loaded: bool) {
        if dish.id.is_empty() {
            return;
        }

        let mut state = self.state();
        match state.dishes.iter().position(|d| d.id == dish.id) {
            Some(idx) => state.dishes[idx] = dish,
            None => state.dishes.insert(0, dish),
        }
        if mark_loaded {
            state.fully_loaded = true;
        }
        state.rebuild_index();
        self.persist(&state);
    }

    fn persist(&self, state: &CatalogState) {
        match serde_json::to_value(&state.dishes) {
            Ok(value) => {
                if let Err(e) = self.store.set(DISHES_KEY, &value) {
                    debug!(error = %e, "Failed to persist dish catalog");
                }
                let ts = Value::String(Utc::now().to_rfc3339());
                if let Err(e) = self.store.set(DISHES_TS_KEY, &ts) {
                    debug!(error = %e, "Failed to persist catalog timestamp");
                }
            }
            Err(e) => debug!(error = %e, "Failed to serialize dish catalog"),
        }
    }

    fn parse_dish(&self, value: Value) -> Result<Dish, ApiError> {
        let mut dish: Dish = serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected dish payload: {}", e)))?;
        dish.normalize(&self.urls);
        Ok(dish)
    }

    /// The listing endpoint returns either a bare array or `{ data: [...] }`.
    fn parse_dish_list(&self, value: &Value) -> Vec<Dish> {
        let items = if let Some(items) = value.as_array() {
            items
        } else if let Some(items) = value.get("data").and_then(|d| d.as_array()) {
            items
        } else {
            return Vec::new();
        };

        let mut dishes = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<Dish>(item.clone()) {
                Ok(mut dish) => {
                    dish.normalize(&self.urls);
                    dishes.push(dish);
                }
                Err(e) => debug!(error = %e, "Skipping unparseable dish entry"),
            }
        }
        dishes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::testing::MockTransport;
    use crate::cache::MemoryStore;
    use serde_json::json;

    fn catalog() -> (Arc<MockTransport>, Arc<MemoryStore>, CatalogCache) {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        let cache = CatalogCache::new(
            transport.clone(),
            store.clone(),
            UrlResolver::new("http://host:8081/api"),
        );
        (transport, store, cache)
    }

    fn assert_index_invariant(cache: &CatalogCache) {
        let state = cache.state();
        for dish in state.dishes.iter().filter(|d| !d.id.is_empty()) {
            let idx = state.by_id.get(&dish.id).copied().expect("id indexed");
            assert_eq!(&state.dishes[idx], dish);
        }
        for (id, &idx) in &state.by_id {
            assert_eq!(&state.dishes[idx].id, id);
        }
    }

    #[tokio::test]
    async fn test_ensure_loaded_fetches_at_most_once() {
        let (transport, _, cache) = catalog();
        transport.push_ok(json!([{ "_id": "d1", "name": "Eggs" }, { "_id": "d2", "name": "Soup" }]));

        let first = cache.ensure_loaded().await.expect("first load");
        let second = cache.ensure_loaded().await.expect("second load");

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(transport.call_count(), 1);
        assert!(cache.is_fully_loaded());
        assert_index_invariant(&cache);
    }

    #[tokio::test]
    async fn test_ensure_loaded_hydrates_from_store_without_network() {
        let (transport, store, cache) = catalog();
        store
            .set(DISHES_KEY, &json!([{ "_id": "d1", "name": "Eggs" }]))
            .expect("seed store");

        let dishes = cache.ensure_loaded().await.expect("hydrate");
        assert_eq!(dishes.len(), 1);
        assert_eq!(transport.call_count(), 0);
        assert!(cache.is_fully_loaded());
        assert_eq!(cache.lookup_name("d1"), "Eggs");
    }

    #[tokio::test]
    async fn test_ensure_loaded_ignores_empty_persisted_collection() {
        let (transport, store, cache) = catalog();
        store.set(DISHES_KEY, &json!([])).expect("seed store");
        transport.push_ok(json!([{ "_id": "d1", "name": "Eggs" }]));

        let dishes = cache.ensure_loaded().await.expect("load");
        assert_eq!(dishes.len(), 1);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_replaces_and_normalizes() {
        let (transport, store, cache) = catalog();
        transport.push_ok(json!([{ "_id": "d1", "name": "Eggs", "imageUrl": "/uploads/e.jpg" }]));

        let dishes = cache.fetch_all().await.expect("fetch");
        assert_eq!(
            dishes[0].image_url.as_deref(),
            Some("http://host:8081/uploads/e.jpg")
        );
        assert!(store.get(DISHES_KEY).is_some());
        assert!(store.get(DISHES_TS_KEY).is_some());
    }

    #[tokio::test]
    async fn test_fetch_list_is_read_through() {
        let (transport, _, cache) = catalog();
        transport.push_ok(json!([{ "_id": "d1", "name": "Eggs" }]));
        cache.ensure_loaded().await.expect("seed");

        transport.push_ok(json!({ "data": [{ "_id": "d9", "name": "Soup" }], "total": 1 }));
        let page = cache
            .fetch_list(&DishFilter {
                search: Some("soup".to_string()),
                ..Default::default()
            })
            .await
            .expect("list");

        assert_eq!(page.list.len(), 1);
        assert_eq!(page.raw["total"], json!(1));

        // The filtered page never enters the cache
        assert_eq!(cache.all().len(), 1);
        assert!(cache.lookup("d9").is_none());
        assert!(cache.is_fully_loaded());

        let call = &transport.calls()[1];
        assert_eq!(call.path, "/meals");
        assert_eq!(call.query, vec![("search".to_string(), "soup".to_string())]);
    }

    #[tokio::test]
    async fn test_fetch_by_id_upserts_without_marking_loaded() {
        let (transport, _, cache) = catalog();
        transport.push_ok(json!({ "_id": "d1", "name": "Eggs v2" }));

        let dish = cache.fetch_by_id("d1").await.expect("fetch");
        assert_eq!(dish.name, "Eggs v2");
        assert_eq!(cache.lookup_name("d1"), "Eggs v2");
        assert!(!cache.is_fully_loaded());
        assert_index_invariant(&cache);
    }

    #[tokio::test]
    async fn test_create_inserts_at_front_and_marks_loaded() {
        let (transport, store, cache) = catalog();
        transport.push_ok(json!([{ "_id": "d1", "name": "Eggs" }]));
        cache.ensure_loaded().await.expect("seed");

        transport.push_ok(json!({ "_id": "d2", "name": "Soup" }));
        let payload = DishPayload {
            name: "Soup".to_string(),
            ..Default::default()
        };
        cache.create(&payload, None).await.expect("create");

        let all = cache.all();
        assert_eq!(all[0].id, "d2");
        assert_eq!(all.len(), 2);
        assert!(cache.is_fully_loaded());
        assert_index_invariant(&cache);

        let persisted = store.get(DISHES_KEY).expect("persisted");
        assert_eq!(persisted.as_array().expect("array").len(), 2);
    }

    #[tokio::test]
    async fn test_create_with_image_goes_through_upload() {
        let (transport, _, cache) = catalog();
        transport.push_ok(json!({ "_id": "d3", "name": "Stew" }));

        let payload = DishPayload {
            name: "Stew".to_string(),
            tags: vec!["dinner".to_string()],
            steps: vec!["Chop".to_string(), "Simmer".to_string()],
            ..Default::default()
        };
        cache
            .create(&payload, Some(Path::new("/tmp/stew.jpg")))
            .await
            .expect("create");

        let calls = transport.calls();
        let upload = calls[0].upload.as_ref().expect("upload call");
        assert_eq!(upload.field_name, "image");
        assert_eq!(upload.fields["name"], json!("Stew"));
        assert_eq!(upload.fields["tags"], json!(["dinner"]));
        assert_eq!(cache.lookup_name("d3"), "Stew");
    }

    #[tokio::test]
    async fn test_create_then_update_leaves_single_entry() {
        let (transport, _, cache) = catalog();
        transport.push_ok(json!({ "_id": "dx", "name": "Pie" }));
        transport.push_ok(json!({ "_id": "dx", "name": "Apple pie" }));

        let payload = DishPayload {
            name: "Pie".to_string(),
            ..Default::default()
        };
        cache.create(&payload, None).await.expect("create");
        cache.update("dx", &payload, None).await.expect("update");

        let all = cache.all();
        assert_eq!(all.iter().filter(|d| d.id == "dx").count(), 1);
        assert_eq!(cache.lookup_name("dx"), "Apple pie");
        assert_index_invariant(&cache);
    }

    #[tokio::test]
    async fn test_update_empty_id_fails_before_any_io() {
        let (transport, _, cache) = catalog();
        let payload = DishPayload::default();

        let err = cache.update("", &payload, None).await.expect_err("precondition");
        assert!(matches!(err, ApiError::MissingId(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_from_collection_and_index() {
        let (transport, _, cache) = catalog();
        transport.push_ok(json!([{ "_id": "d1", "name": "Eggs" }, { "_id": "d2", "name": "Soup" }]));
        cache.ensure_loaded().await.expect("seed");

        transport.push_ok(json!({ "ok": true }));
        cache.delete("d1").await.expect("delete");

        let all = cache.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "d2");
        assert!(cache.lookup("d1").is_none());
        assert_index_invariant(&cache);
    }

    #[tokio::test]
    async fn test_delete_empty_id_fails_before_any_io() {
        let (transport, _, cache) = catalog();
        let err = cache.delete("").await.expect_err("precondition");
        assert!(matches!(err, ApiError::MissingId(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_propagates_without_mutation() {
        let (transport, _, cache) = catalog();
        transport.push_ok(json!([{ "_id": "d1", "name": "Eggs" }]));
        cache.ensure_loaded().await.expect("seed");

        transport.push_err(ApiError::Remote("Dish not found".to_string()));
        let err = cache.delete("d1").await.expect_err("remote failure");
        assert!(matches!(err, ApiError::Remote(_)));
        assert_eq!(cache.all().len(), 1);
    }

    #[test]
    fn test_lookup_name_falls_back_to_empty() {
        let (_, _, cache) = catalog();
        assert_eq!(cache.lookup_name("missing"), "");
        assert!(cache.lookup("").is_none());
    }
}
