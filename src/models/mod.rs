//! Data models for meal-planning entities.
//!
//! This module contains all the data structures used to represent
//! server data including:
//!
//! - `Dish`, `Ingredient`, `DishPayload`: the shared catalog of recipes
//! - `DaySchedule`, `MealSlots`, `MealRef`, `MealType`: calendar assignments
//! - `User`, `AddedBy`: accounts and slot attribution

pub mod dish;
pub mod schedule;
pub mod user;

pub use dish::{parse_ingredients_text, parse_steps_text, Dish, DishPayload, Ingredient};
pub use schedule::{AddedBy, DaySchedule, MealRef, MealSlots, MealType};
pub use user::User;
