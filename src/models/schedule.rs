//! Calendar schedule entities.
//!
//! A `DaySchedule` holds the three meal slots for one calendar date. Slot
//! entries arrive from the server in several shapes - a bare dish id, an
//! embedded dish object, or a wrapper carrying `addedBy` attribution - so
//! they are modeled as the [`MealRef`] variant with a single id-extraction
//! path instead of shape-sniffing at every call site.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::url::UrlResolver;

use super::Dish;

/// The three meal slots of a calendar date, canonical lowercase wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealType {
    pub const ALL: [MealType; 3] = [MealType::Breakfast, MealType::Lunch, MealType::Dinner];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slot entry: a dish reference plus optional attribution.
///
/// Untagged on the wire. `Attributed` is tried first so objects carrying a
/// `meal` key do not get swallowed by the lenient `Embedded` dish shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MealRef {
    Attributed {
        meal: Box<MealRef>,
        #[serde(rename = "addedBy", default, skip_serializing_if = "Option::is_none")]
        added_by: Option<AddedBy>,
    },
    Embedded(Box<Dish>),
    Id(String),
}

impl MealRef {
    /// Resolve any variant to the plain dish id, if one is present.
    pub fn dish_id(&self) -> Option<&str> {
        match self {
            MealRef::Id(id) if !id.is_empty() => Some(id),
            MealRef::Id(_) => None,
            MealRef::Embedded(dish) if !dish.id.is_empty() => Some(&dish.id),
            MealRef::Embedded(_) => None,
            MealRef::Attributed { meal, .. } => meal.dish_id(),
        }
    }

    /// The dish name carried inline, when the reference embeds one.
    pub fn embedded_name(&self) -> Option<&str> {
        match self {
            MealRef::Embedded(dish) if !dish.name.is_empty() => Some(&dish.name),
            MealRef::Attributed { meal, .. } => meal.embedded_name(),
            _ => None,
        }
    }

    pub fn added_by(&self) -> Option<&AddedBy> {
        match self {
            MealRef::Attributed { added_by, .. } => added_by.as_ref(),
            _ => None,
        }
    }
}

/// Attribution for who added a dish to a slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddedBy {
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "avatarUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl AddedBy {
    /// Display label: the display name, falling back to the username.
    pub fn label(&self) -> String {
        self.display_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.username.as_deref())
            .unwrap_or("")
            .trim()
            .to_string()
    }

    /// The avatar URL in fully-qualified form.
    pub fn avatar_resolved(&self, urls: &UrlResolver) -> Option<String> {
        self.avatar_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| urls.image_url(u))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MealSlots {
    #[serde(default)]
    pub breakfast: Vec<MealRef>,
    #[serde(default)]
    pub lunch: Vec<MealRef>,
    #[serde(default)]
    pub dinner: Vec<MealRef>,
}

impl MealSlots {
    pub fn slot(&self, meal_type: MealType) -> &[MealRef] {
        match meal_type {
            MealType::Breakfast => &self.breakfast,
            MealType::Lunch => &self.lunch,
            MealType::Dinner => &self.dinner,
        }
    }
}

/// The assignments for one calendar date. A date with no record simply has
/// no assignments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DaySchedule {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub meals: MealSlots,
}

impl DaySchedule {
    /// All dish ids assigned on this date, in slot order.
    pub fn dish_ids(&self) -> Vec<&str> {
        MealType::ALL
            .iter()
            .flat_map(|mt| self.meals.slot(*mt))
            .filter_map(|r| r.dish_id())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meal_ref_id_variant() {
        let r: MealRef = serde_json::from_value(json!("d1")).expect("id should parse");
        assert_eq!(r.dish_id(), Some("d1"));
        assert!(r.added_by().is_none());
    }

    #[test]
    fn test_meal_ref_embedded_variant() {
        let r: MealRef = serde_json::from_value(json!({ "_id": "d2", "name": "Eggs" }))
            .expect("embedded should parse");
        assert_eq!(r.dish_id(), Some("d2"));
        assert_eq!(r.embedded_name(), Some("Eggs"));
    }

    #[test]
    fn test_meal_ref_attributed_variant() {
        let r: MealRef = serde_json::from_value(json!({
            "meal": { "_id": "d3", "name": "Soup" },
            "addedBy": { "displayName": "Mom", "avatarUrl": "/uploads/mom.png" }
        }))
        .expect("attributed should parse");
        assert_eq!(r.dish_id(), Some("d3"));
        assert_eq!(r.embedded_name(), Some("Soup"));
        assert_eq!(r.added_by().expect("attribution").label(), "Mom");
    }

    #[test]
    fn test_meal_ref_attributed_with_id_string() {
        let r: MealRef = serde_json::from_value(json!({ "meal": "d4" }))
            .expect("attributed id should parse");
        assert_eq!(r.dish_id(), Some("d4"));
        assert!(r.added_by().is_none());
    }

    #[test]
    fn test_meal_ref_empty_id_resolves_to_none() {
        let r: MealRef = serde_json::from_value(json!("")).expect("empty id should parse");
        assert_eq!(r.dish_id(), None);
    }

    #[test]
    fn test_added_by_label_fallback() {
        let a = AddedBy {
            display_name: Some("  ".to_string()),
            username: Some("mom".to_string()),
            avatar_url: None,
        };
        assert_eq!(a.label(), "mom");
        assert_eq!(AddedBy::default().label(), "");
    }

    #[test]
    fn test_added_by_avatar_resolved() {
        let urls = UrlResolver::new("http://host:8081/api");
        let a = AddedBy {
            display_name: None,
            username: None,
            avatar_url: Some("/uploads/mom.png".to_string()),
        };
        assert_eq!(
            a.avatar_resolved(&urls).as_deref(),
            Some("http://host:8081/uploads/mom.png")
        );
    }

    #[test]
    fn test_day_schedule_parses_with_missing_slots() {
        let day: DaySchedule = serde_json::from_value(json!({
            "date": "2024-03-15",
            "meals": { "lunch": ["d1", { "_id": "d2" }] }
        }))
        .expect("schedule should parse");
        assert!(day.meals.breakfast.is_empty());
        assert_eq!(day.dish_ids(), vec!["d1", "d2"]);
    }
}
