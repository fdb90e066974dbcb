//! mealcache - client data layer for a household meal-planning service.
//!
//! Pages render instantly from local state while the server stays the
//! single source of truth. Two cooperating caches do the work:
//!
//! - [`CatalogCache`]: the shared dish catalog, keyed by id
//! - [`CalendarCache`]: per-month day schedules, keyed by `"YYYY-MM"`
//!
//! Both sit over a [`Transport`] (reqwest in production) and a synchronous
//! [`KvStore`] persistence bridge, injected at construction:
//!
//! ```no_run
//! use std::sync::Arc;
//! use mealcache::{CalendarCache, CatalogCache, Config, FileStore, HttpTransport};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let store = Arc::new(FileStore::new(config.store_dir()?)?);
//! let transport = Arc::new(HttpTransport::new(config.url_resolver(), store.clone())?);
//!
//! let catalog = CatalogCache::new(transport.clone(), store.clone(), config.url_resolver());
//! let calendar = CalendarCache::new(transport, store);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiError, HttpTransport, Method, Transport};
pub use auth::{AuthSession, AuthState, CredentialStore};
pub use cache::{
    month_key, CalendarCache, CatalogCache, DishFilter, DishPage, FileStore, KvStore, MemoryStore,
};
pub use config::Config;
pub use models::{
    AddedBy, DaySchedule, Dish, DishPayload, Ingredient, MealRef, MealSlots, MealType, User,
};
pub use utils::url::UrlResolver;
