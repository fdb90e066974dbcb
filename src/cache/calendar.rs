//! The calendar schedule cache.
//!
//! Schedules are partitioned by month: each visited month gets its own
//! in-memory entry (schedules plus a by-date index) and its own
//! persistence key under the canonical `"YYYY-MM"` form. Months load on
//! first navigation and are never proactively evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::api::{ApiError, Method, Transport};
use crate::models::{DaySchedule, MealType};

use super::KvStore;

/// Canonical month key: `"{year}-{zero-padded 2-digit month}"`.
///
/// Persistence keys and in-memory map keys both use this exact form, so
/// calendar data stays interoperable across a session restart.
pub fn month_key(year: i32, month: u32) -> String {
    format!("{}-{:02}", year, month)
}

fn storage_key(year: i32, month: u32) -> String {
    format!("schedules:{}", month_key(year, month))
}

/// Year and month of a `"YYYY-MM-DD"` date. `None` when either part is
/// missing, unparseable, or zero.
fn split_date(date: &str) -> Option<(i32, u32)> {
    let mut parts = date.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    if year == 0 || month == 0 {
        return None;
    }
    Some((year, month))
}

/// Persisted month envelope. Older clients wrote the bare schedule array,
/// so reads accept both forms.
#[derive(Debug, Serialize, Deserialize)]
struct MonthRecord {
    ts: DateTime<Utc>,
    data: Vec<DaySchedule>,
}

struct MonthEntry {
    schedules: Vec<DaySchedule>,
    by_date: HashMap<String, usize>,
}

impl MonthEntry {
    fn new(schedules: Vec<DaySchedule>) -> Self {
        let mut entry = Self {
            schedules,
            by_date: HashMap::new(),
        };
        entry.rebuild_index();
        entry
    }

    /// `by_date` is always exactly the by-date index of `schedules`.
    fn rebuild_index(&mut self) {
        self.by_date.clear();
        for (idx, schedule) in self.schedules.iter().enumerate() {
            if !schedule.date.is_empty() {
                self.by_date.insert(schedule.date.clone(), idx);
            }
        }
    }
}

pub struct CalendarCache {
    transport: Arc<dyn Transport>,
    store: Arc<dyn KvStore>,
    months: Mutex<HashMap<String, MonthEntry>>,
}

impl CalendarCache {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn KvStore>) -> Self {
        Self {
            transport,
            store,
            months: Mutex::new(HashMap::new()),
        }
    }

    /// Return one month's schedules through three-tier resolution:
    /// in-memory entry, persisted entry, then remote fetch. Each tier that
    /// succeeds populates the tiers above it; repeated unforced calls
    /// issue no redundant network traffic.
    pub async fn get_month(
        &self,
        year: i32,
        month: u32,
        force_refresh: bool,
    ) -> Result<Vec<DaySchedule>, ApiError> {
        let key = month_key(year, month);

        if !force_refresh {
            let months = self.months();
            if let Some(entry) = months.get(&key) {
                return Ok(entry.schedules.clone());
            }
        }

        if !force_refresh {
            if let Some(schedules) = self.load_month_from_store(year, month) {
                let entry = MonthEntry::new(schedules);
                let out = entry.schedules.clone();
                self.months().insert(key, entry);
                return Ok(out);
            }
        }

        self.fetch_month(year, month).await
    }

    /// Unconditional remote fetch for one month; rebuilds the month entry
    /// and persists it under the canonical key.
    pub async fn fetch_month(&self, year: i32, month: u32) -> Result<Vec<DaySchedule>, ApiError> {
        let query = vec![
            ("year".to_string(), year.to_string()),
            ("month".to_string(), month.to_string()),
        ];
        let value = self
            .transport
            .send("/schedules", Method::Get, &query, None)
            .await?;

        let entry = MonthEntry::new(parse_schedule_list(&value));
        self.persist_month(year, month, &entry.schedules);

        let out = entry.schedules.clone();
        self.months().insert(month_key(year, month), entry);
        Ok(out)
    }

    /// The by-date index of an in-memory month entry. Empty when the month
    /// is not loaded; never triggers a load.
    pub fn by_date(&self, year: i32, month: u32) -> HashMap<String, DaySchedule> {
        let months = self.months();
        months
            .get(&month_key(year, month))
            .map(|entry| {
                entry
                    .by_date
                    .iter()
                    .map(|(date, &idx)| (date.clone(), entry.schedules[idx].clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace one date/meal-type slot with the given id list.
    ///
    /// The server returns the full updated day record. When the containing
    /// month is loaded in memory, the matching schedule is replaced by
    /// date equality and the month re-persisted; when it is not loaded,
    /// the local cache is deliberately left untouched - the next forced or
    /// cold load picks up the change. The cache never materializes a month
    /// just to patch it.
    pub async fn update_slot(
        &self,
        date: &str,
        meal_type: MealType,
        dish_ids: &[String],
    ) -> Result<DaySchedule, ApiError> {
        let path = format!("/schedules/{}/{}", date, meal_type.as_str());
        let body = json!({ "mealIds": dish_ids });
        let value = self.transport.send(&path, Method::Put, &[], Some(body)).await?;

        let updated: DaySchedule = serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected schedule payload: {}", e)))?;

        if let Some((year, month)) = split_date(date) {
            let snapshot = {
                let mut months = self.months();
                match months.get_mut(&month_key(year, month)) {
                    Some(entry) => {
                        for schedule in entry.schedules.iter_mut() {
                            if schedule.date == date {
                                *schedule = updated.clone();
                            }
                        }
                        entry.rebuild_index();
                        Some(entry.schedules.clone())
                    }
                    None => None,
                }
            };
            if let Some(schedules) = snapshot {
                self.persist_month(year, month, &schedules);
            }
        }

        Ok(updated)
    }

    fn months(&self) -> MutexGuard<'_, HashMap<String, MonthEntry>> {
        self.months.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load_month_from_store(&self, year: i32, month: u32) -> Option<Vec<DaySchedule>> {
        let value = self.store.get(&storage_key(year, month))?;

        if let Ok(record) = serde_json::from_value::<MonthRecord>(value.clone()) {
            return Some(record.data);
        }
        match serde_json::from_value::<Vec<DaySchedule>>(value) {
            Ok(schedules) => Some(schedules),
            Err(e) => {
                debug!(year, month, error = %e, "Ignoring unreadable persisted month");
                None
            }
        }
    }

    fn persist_month(&self, year: i32, month: u32, schedules: &[DaySchedule]) {
        let record = MonthRecord {
            ts: Utc::now(),
            data: schedules.to_vec(),
        };
        match serde_json::to_value(&record) {
            Ok(value) => {
                if let Err(e) = self.store.set(&storage_key(year, month), &value) {
                    debug!(year, month, error = %e, "Failed to persist month");
                }
            }
            Err(e) => debug!(year, month, error = %e, "Failed to serialize month"),
        }
    }
}

fn parse_schedule_list(value: &Value) -> Vec<DaySchedule> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    let mut schedules = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<DaySchedule>(item.clone()) {
            Ok(schedule) => schedules.push(schedule),
            Err(e) => debug!(error = %e, "Skipping unparseable schedule entry"),
        }
    }
    schedules
}
