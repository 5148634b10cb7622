use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::day_key::DayKey;
use crate::numeric;

pub type EntryId = String;

/// The four fixed categories entries are filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snacks,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown meal slot `{0}`; expected Breakfast|Lunch|Dinner|Snacks")]
pub struct UnknownMealSlot(pub String);

impl MealSlot {
    pub const ALL: [MealSlot; 4] = [
        MealSlot::Breakfast,
        MealSlot::Lunch,
        MealSlot::Dinner,
        MealSlot::Snacks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealSlot::Breakfast => "Breakfast",
            MealSlot::Lunch => "Lunch",
            MealSlot::Dinner => "Dinner",
            MealSlot::Snacks => "Snacks",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealSlot {
    type Err = UnknownMealSlot;

    /// Case-insensitive over the canonical names only. No other spelling is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MealSlot::ALL
            .into_iter()
            .find(|slot| slot.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMealSlot(s.to_string()))
    }
}

/// One logged food occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodEntry {
    pub id: EntryId,
    pub name: String,
    #[serde(default, deserialize_with = "numeric::zero_if_invalid")]
    pub calories: f64,
    #[serde(default, deserialize_with = "numeric::zero_if_invalid")]
    pub protein: f64,
    #[serde(default, deserialize_with = "numeric::zero_if_invalid")]
    pub carbs: f64,
    #[serde(default, deserialize_with = "numeric::zero_if_invalid")]
    pub fat: f64,
    #[serde(default, alias = "servingSize")]
    pub serving_description: String,
    /// Unix milliseconds.
    #[serde(default, alias = "timestamp")]
    pub created_at: i64,
}

/// Input for a new entry. `id` and `created_at` are generated when absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    #[serde(default)]
    pub id: Option<EntryId>,
    pub name: String,
    #[serde(default, deserialize_with = "numeric::zero_if_invalid")]
    pub calories: f64,
    #[serde(default, deserialize_with = "numeric::zero_if_invalid")]
    pub protein: f64,
    #[serde(default, deserialize_with = "numeric::zero_if_invalid")]
    pub carbs: f64,
    #[serde(default, deserialize_with = "numeric::zero_if_invalid")]
    pub fat: f64,
    #[serde(default)]
    pub serving_description: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Partial edit of a [`FoodEntry`]. Every field is optional; see [`EntryPatch::apply_to`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "numeric::lenient_f64")]
    pub calories: Option<f64>,
    #[serde(default, deserialize_with = "numeric::lenient_f64")]
    pub protein: Option<f64>,
    #[serde(default, deserialize_with = "numeric::lenient_f64")]
    pub carbs: Option<f64>,
    #[serde(default, deserialize_with = "numeric::lenient_f64")]
    pub fat: Option<f64>,
    #[serde(default)]
    pub serving_description: Option<String>,
}

impl EntryPatch {
    /// Returns `entry` with every field present in the patch replaced.
    ///
    /// `id` and `created_at` are never touched. A blank name keeps the old
    /// one, and nutrient values are floored at zero.
    pub fn apply_to(&self, entry: &FoodEntry) -> FoodEntry {
        let mut next = entry.clone();
        if let Some(name) = self.name.as_deref().map(str::trim) {
            if !name.is_empty() {
                next.name = name.to_string();
            }
        }
        if let Some(v) = self.calories {
            next.calories = non_negative(v);
        }
        if let Some(v) = self.protein {
            next.protein = non_negative(v);
        }
        if let Some(v) = self.carbs {
            next.carbs = non_negative(v);
        }
        if let Some(v) = self.fat {
            next.fat = non_negative(v);
        }
        if let Some(serving) = &self.serving_description {
            next.serving_description = serving.clone();
        }
        next
    }
}

pub(crate) fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Entries of one day, one ordered list per slot. All four slots always exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meals {
    #[serde(rename = "Breakfast", default)]
    pub breakfast: Vec<FoodEntry>,
    #[serde(rename = "Lunch", default)]
    pub lunch: Vec<FoodEntry>,
    #[serde(rename = "Dinner", default)]
    pub dinner: Vec<FoodEntry>,
    #[serde(rename = "Snacks", default)]
    pub snacks: Vec<FoodEntry>,
}

impl Meals {
    pub fn slot(&self, slot: MealSlot) -> &[FoodEntry] {
        match slot {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::Lunch => &self.lunch,
            MealSlot::Dinner => &self.dinner,
            MealSlot::Snacks => &self.snacks,
        }
    }

    pub fn slot_mut(&mut self, slot: MealSlot) -> &mut Vec<FoodEntry> {
        match slot {
            MealSlot::Breakfast => &mut self.breakfast,
            MealSlot::Lunch => &mut self.lunch,
            MealSlot::Dinner => &mut self.dinner,
            MealSlot::Snacks => &mut self.snacks,
        }
    }

    /// Slots in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (MealSlot, &[FoodEntry])> + '_ {
        MealSlot::ALL.into_iter().map(move |slot| (slot, self.slot(slot)))
    }

    pub fn entries(&self) -> impl Iterator<Item = &FoodEntry> + '_ {
        self.iter().flat_map(|(_, entries)| entries.iter())
    }
}

/// One calendar day's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    #[serde(alias = "date")]
    pub day_key: DayKey,
    #[serde(default)]
    pub meals: Meals,
    #[serde(default, alias = "waterIntake")]
    pub water_count: u32,
    #[serde(default, alias = "weight", skip_serializing_if = "Option::is_none")]
    pub weight_sample: Option<f64>,
}

impl DayRecord {
    pub fn empty(day_key: DayKey) -> Self {
        Self {
            day_key,
            meals: Meals::default(),
            water_count: 0,
            weight_sample: None,
        }
    }

    /// At least one slot is non-empty.
    pub fn has_entries(&self) -> bool {
        self.meals.iter().any(|(_, entries)| !entries.is_empty())
    }

    pub fn find(&self, id: &str) -> Option<(MealSlot, &FoodEntry)> {
        self.meals
            .iter()
            .find_map(|(slot, entries)| entries.iter().find(|e| e.id == id).map(|e| (slot, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str) -> FoodEntry {
        FoodEntry {
            id: id.into(),
            name: "Oats".into(),
            calories: 150.0,
            protein: 5.0,
            carbs: 27.0,
            fat: 3.0,
            serving_description: "1 cup".into(),
            created_at: 1,
        }
    }

    #[test]
    fn meal_slot_parse_is_strict_but_case_insensitive() {
        assert_eq!("Lunch".parse::<MealSlot>().unwrap(), MealSlot::Lunch);
        assert_eq!("snacks".parse::<MealSlot>().unwrap(), MealSlot::Snacks);
        assert_eq!(
            "Brunch".parse::<MealSlot>(),
            Err(UnknownMealSlot("Brunch".into()))
        );
    }

    #[test]
    fn empty_day_serializes_all_four_slots() {
        let day = DayRecord::empty(DayKey::parse("2024-05-01").unwrap());
        let value = serde_json::to_value(&day).unwrap();
        let meals = value["meals"].as_object().unwrap();
        assert_eq!(meals.len(), 4);
        for slot in MealSlot::ALL {
            assert_eq!(meals[slot.as_str()], json!([]));
        }
        assert!(value.get("weightSample").is_none());
    }

    #[test]
    fn legacy_day_shape_loads_with_missing_slots_and_null_numbers() {
        let day: DayRecord = serde_json::from_value(json!({
            "date": "2024-05-01",
            "meals": {
                "Lunch": [{
                    "id": "k3j9x0a2b",
                    "name": "Dal",
                    "calories": null,
                    "protein": 9,
                    "servingSize": "1 bowl",
                    "timestamp": 1714550000000i64
                }]
            },
            "waterIntake": 3,
            "weight": 72.5
        }))
        .unwrap();
        assert_eq!(day.water_count, 3);
        assert_eq!(day.weight_sample, Some(72.5));
        assert!(day.meals.breakfast.is_empty());
        let dal = &day.meals.lunch[0];
        assert_eq!(dal.calories, 0.0);
        assert_eq!(dal.carbs, 0.0);
        assert_eq!(dal.serving_description, "1 bowl");
        assert_eq!(dal.created_at, 1714550000000);
    }

    #[test]
    fn patch_merges_present_fields_only() {
        let original = entry("a");
        let patch = EntryPatch {
            name: Some("  ".into()),
            calories: Some(-40.0),
            fat: Some(4.5),
            ..Default::default()
        };
        let patched = patch.apply_to(&original);
        assert_eq!(patched.id, original.id);
        assert_eq!(patched.created_at, original.created_at);
        assert_eq!(patched.name, "Oats");
        assert_eq!(patched.calories, 0.0);
        assert_eq!(patched.protein, 5.0);
        assert_eq!(patched.fat, 4.5);
    }

    #[test]
    fn patch_coerces_non_numeric_form_input() {
        let patch: EntryPatch =
            serde_json::from_value(json!({ "protein": "lots", "carbs": "31.5" })).unwrap();
        assert_eq!(patch.protein, Some(0.0));
        assert_eq!(patch.carbs, Some(31.5));
        assert_eq!(patch.calories, None);
    }
}
