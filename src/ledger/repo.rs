use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::repo_types::{
    non_negative, DayRecord, EntryId, EntryPatch, FoodEntry, MealSlot, NewEntry,
};
use crate::day_key::DayKey;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("entry `{id}` not found in {slot} on {day}")]
    EntryNotFound {
        day: DayKey,
        slot: MealSlot,
        id: EntryId,
    },
    #[error("entry id `{0}` already exists in the ledger")]
    DuplicateEntryId(EntryId),
    #[error("food name must not be empty")]
    EmptyName,
}

/// Latest accepted `createdAt`: 9999-12-31T23:59:59.999Z in unix ms.
pub const MAX_CREATED_AT_MS: i64 = 253_402_300_799_999;

/// Day key -> day record. Iterates in calendar order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    days: BTreeMap<DayKey, DayRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-keys records whose stored `dayKey` disagrees with their map key.
    pub fn normalized(mut self) -> Self {
        for (key, record) in self.days.iter_mut() {
            record.day_key = *key;
        }
        self
    }

    pub fn get(&self, day: &DayKey) -> Option<&DayRecord> {
        self.days.get(day)
    }

    /// Stored record or a fresh empty one. Never inserts.
    pub fn get_or_create(&self, day: DayKey) -> DayRecord {
        self.days
            .get(&day)
            .cloned()
            .unwrap_or_else(|| DayRecord::empty(day))
    }

    /// Replaces the record for `day` wholesale.
    pub fn put(&mut self, day: DayKey, mut record: DayRecord) {
        record.day_key = day;
        self.days.insert(day, record);
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn contains_entry(&self, id: &str) -> bool {
        self.days.values().any(|day| day.find(id).is_some())
    }

    /// Appends `entries` to the end of `slot` on `day`, in the given order.
    ///
    /// Missing ids are generated. Timestamps default to `now_ms`, are clamped
    /// to `0..=MAX_CREATED_AT_MS` and always land strictly after the slot's
    /// last entry. The whole batch is rejected, leaving the ledger
    /// untouched, if any name is blank or any supplied id is already taken.
    pub fn add_entries(
        &mut self,
        day: DayKey,
        slot: MealSlot,
        entries: Vec<NewEntry>,
        now_ms: i64,
    ) -> Result<Vec<FoodEntry>, LedgerError> {
        let mut batch_ids = HashSet::new();
        for entry in &entries {
            if entry.name.trim().is_empty() {
                return Err(LedgerError::EmptyName);
            }
            if let Some(id) = &entry.id {
                if self.contains_entry(id) || !batch_ids.insert(id.clone()) {
                    return Err(LedgerError::DuplicateEntryId(id.clone()));
                }
            }
        }

        let mut record = self.get_or_create(day);
        let list = record.meals.slot_mut(slot);
        let mut last_created = list.last().map(|e| e.created_at);
        let mut added = Vec::with_capacity(entries.len());

        for entry in entries {
            let requested = entry
                .created_at
                .unwrap_or(now_ms)
                .clamp(0, MAX_CREATED_AT_MS);
            let created_at = match last_created {
                Some(prev) => requested.max(prev.saturating_add(1)),
                None => requested,
            };
            last_created = Some(created_at);

            let food = FoodEntry {
                id: entry.id.unwrap_or_else(|| self.fresh_id(&batch_ids)),
                name: entry.name.trim().to_string(),
                calories: non_negative(entry.calories),
                protein: non_negative(entry.protein),
                carbs: non_negative(entry.carbs),
                fat: non_negative(entry.fat),
                serving_description: entry.serving_description,
                created_at,
            };
            batch_ids.insert(food.id.clone());
            list.push(food.clone());
            added.push(food);
        }

        debug!(%day, %slot, count = added.len(), "entries added");
        self.put(day, record);
        Ok(added)
    }

    fn fresh_id(&self, taken: &HashSet<EntryId>) -> EntryId {
        loop {
            let id = Uuid::new_v4().simple().to_string();
            if !taken.contains(&id) && !self.contains_entry(&id) {
                return id;
            }
        }
    }

    /// Replaces the matching entry in place, keeping its position.
    pub fn update_entry(
        &mut self,
        day: DayKey,
        slot: MealSlot,
        id: &str,
        patch: &EntryPatch,
    ) -> Result<FoodEntry, LedgerError> {
        let not_found = || LedgerError::EntryNotFound {
            day,
            slot,
            id: id.to_string(),
        };
        let mut record = self.days.get(&day).cloned().ok_or_else(not_found)?;
        let list = record.meals.slot_mut(slot);
        let position = list.iter().position(|e| e.id == id).ok_or_else(not_found)?;

        let updated = patch.apply_to(&list[position]);
        list[position] = updated.clone();
        self.put(day, record);
        Ok(updated)
    }

    /// Removes the entry with `id` from `slot`. `None` when nothing matched.
    pub fn remove_entry(&mut self, day: DayKey, slot: MealSlot, id: &str) -> Option<FoodEntry> {
        let mut record = self.days.get(&day).cloned()?;
        let list = record.meals.slot_mut(slot);
        let position = list.iter().position(|e| e.id == id)?;
        let removed = list.remove(position);
        self.put(day, record);
        Some(removed)
    }

    pub fn set_water(&mut self, day: DayKey, count: u32) -> DayRecord {
        let mut record = self.get_or_create(day);
        record.water_count = count;
        self.put(day, record.clone());
        record
    }

    /// `None` clears the day's sample.
    pub fn set_weight(&mut self, day: DayKey, weight: Option<f64>) -> DayRecord {
        let mut record = self.get_or_create(day);
        record.weight_sample = weight;
        self.put(day, record.clone());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(raw: &str) -> DayKey {
        DayKey::parse(raw).unwrap()
    }

    fn food(name: &str, calories: f64) -> NewEntry {
        NewEntry {
            name: name.into(),
            calories,
            protein: 10.0,
            carbs: 20.0,
            fat: 5.0,
            serving_description: "1 plate".into(),
            ..Default::default()
        }
    }

    #[test]
    fn get_or_create_does_not_insert() {
        let ledger = Ledger::new();
        let record = ledger.get_or_create(day("2024-06-01"));
        assert!(!record.has_entries());
        assert_eq!(record.water_count, 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn put_forces_the_record_key() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-01");
        ledger.put(d, DayRecord::empty(day("1999-01-01")));
        assert_eq!(ledger.get(&d).unwrap().day_key, d);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn add_appends_in_order_with_increasing_timestamps() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-01");
        ledger
            .add_entries(d, MealSlot::Lunch, vec![food("Rice", 200.0)], 1_000)
            .unwrap();
        let added = ledger
            .add_entries(
                d,
                MealSlot::Lunch,
                vec![food("Dal", 150.0), food("Curd", 60.0)],
                1_000,
            )
            .unwrap();

        let lunch = ledger.get(&d).unwrap().meals.slot(MealSlot::Lunch).to_vec();
        let names: Vec<_> = lunch.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Rice", "Dal", "Curd"]);
        assert_eq!(added.len(), 2);
        assert!(lunch.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[test]
    fn supplied_timestamps_never_go_backwards() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-01");
        ledger
            .add_entries(d, MealSlot::Dinner, vec![food("Soup", 90.0)], 1_000)
            .unwrap();
        let early = NewEntry {
            created_at: Some(5),
            ..food("Bread", 120.0)
        };
        let added = ledger.add_entries(d, MealSlot::Dinner, vec![early], 1_000).unwrap();
        assert_eq!(added[0].created_at, 1_001);

        let stamps: Vec<_> = ledger
            .get(&d)
            .unwrap()
            .meals
            .slot(MealSlot::Dinner)
            .iter()
            .map(|e| e.created_at)
            .collect();
        assert_eq!(stamps, [1_000, 1_001]);
    }

    #[test]
    fn extreme_timestamps_are_clamped() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-10");
        let huge = NewEntry {
            created_at: Some(i64::MAX),
            ..food("A", 10.0)
        };
        let negative = NewEntry {
            created_at: Some(i64::MIN),
            ..food("Z", 10.0)
        };
        let first = ledger.add_entries(d, MealSlot::Snacks, vec![huge], 1_000).unwrap();
        assert_eq!(first[0].created_at, MAX_CREATED_AT_MS);

        let next = ledger
            .add_entries(d, MealSlot::Snacks, vec![food("B", 10.0)], 1_000)
            .unwrap();
        assert_eq!(next[0].created_at, MAX_CREATED_AT_MS + 1);

        let other = ledger.add_entries(d, MealSlot::Lunch, vec![negative], 1_000).unwrap();
        assert_eq!(other[0].created_at, 0);
    }

    #[test]
    fn saturates_after_a_loaded_maximum_timestamp() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-10");
        let mut record = DayRecord::empty(d);
        record.meals.slot_mut(MealSlot::Snacks).push(FoodEntry {
            id: "legacy".into(),
            name: "Old".into(),
            calories: 0.0,
            protein: 0.0,
            carbs: 0.0,
            fat: 0.0,
            serving_description: String::new(),
            created_at: i64::MAX,
        });
        ledger.put(d, record);

        let added = ledger
            .add_entries(d, MealSlot::Snacks, vec![food("B", 10.0)], 1_000)
            .unwrap();
        assert_eq!(added[0].created_at, i64::MAX);
    }

    #[test]
    fn generated_ids_are_unique_across_days() {
        let mut ledger = Ledger::new();
        let mut seen = HashSet::new();
        for (i, raw) in ["2024-06-01", "2024-06-02", "2024-06-03"].iter().enumerate() {
            let batch = (0..50).map(|n| food(&format!("item {n}"), 1.0)).collect();
            let added = ledger
                .add_entries(day(raw), MealSlot::ALL[i], batch, 0)
                .unwrap();
            for entry in added {
                assert!(seen.insert(entry.id), "duplicate id generated");
            }
        }
        assert_eq!(seen.len(), 150);
    }

    #[test]
    fn supplied_duplicate_id_rejects_whole_batch() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-01");
        let mut first = food("Toast", 90.0);
        first.id = Some("fixed".into());
        ledger.add_entries(d, MealSlot::Breakfast, vec![first.clone()], 0).unwrap();
        let before = ledger.clone();

        let err = ledger
            .add_entries(
                day("2024-06-02"),
                MealSlot::Dinner,
                vec![food("Soup", 80.0), first],
                0,
            )
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicateEntryId("fixed".into()));
        assert_eq!(ledger, before);
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut ledger = Ledger::new();
        let err = ledger
            .add_entries(day("2024-06-01"), MealSlot::Snacks, vec![food("  ", 1.0)], 0)
            .unwrap_err();
        assert_eq!(err, LedgerError::EmptyName);
        assert!(ledger.is_empty());
    }

    #[test]
    fn add_then_remove_restores_the_day() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-01");
        ledger
            .add_entries(d, MealSlot::Dinner, vec![food("Paneer", 300.0)], 5)
            .unwrap();
        let before = ledger.get_or_create(d);

        let added = ledger
            .add_entries(d, MealSlot::Dinner, vec![food("Roti", 120.0)], 6)
            .unwrap();
        let removed = ledger
            .remove_entry(d, MealSlot::Dinner, &added[0].id)
            .unwrap();
        assert_eq!(removed.name, "Roti");
        assert_eq!(ledger.get_or_create(d), before);
    }

    #[test]
    fn update_keeps_position_and_identity() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-01");
        let added = ledger
            .add_entries(
                d,
                MealSlot::Breakfast,
                vec![food("Idli", 120.0), food("Sambar", 90.0)],
                0,
            )
            .unwrap();
        let patch = EntryPatch {
            calories: Some(140.0),
            ..Default::default()
        };
        let updated = ledger
            .update_entry(d, MealSlot::Breakfast, &added[0].id, &patch)
            .unwrap();
        assert_eq!(updated.id, added[0].id);
        assert_eq!(updated.created_at, added[0].created_at);

        let breakfast = ledger.get(&d).unwrap().meals.slot(MealSlot::Breakfast);
        assert_eq!(breakfast[0].calories, 140.0);
        assert_eq!(breakfast[1].name, "Sambar");
    }

    #[test]
    fn update_miss_is_reported_and_ledger_unchanged() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-01");
        let added = ledger
            .add_entries(d, MealSlot::Lunch, vec![food("Rice", 200.0)], 0)
            .unwrap();
        let before = ledger.clone();

        // right id, wrong slot
        let err = ledger
            .update_entry(d, MealSlot::Dinner, &added[0].id, &EntryPatch::default())
            .unwrap_err();
        assert!(matches!(err, LedgerError::EntryNotFound { .. }));

        // unknown day is not created by a miss
        let err = ledger
            .update_entry(day("2024-06-09"), MealSlot::Lunch, "nope", &EntryPatch::default())
            .unwrap_err();
        assert!(matches!(err, LedgerError::EntryNotFound { .. }));
        assert_eq!(ledger, before);
    }

    #[test]
    fn remove_miss_is_a_no_op() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-01");
        ledger
            .add_entries(d, MealSlot::Lunch, vec![food("Rice", 200.0)], 0)
            .unwrap();
        let before = ledger.clone();
        assert!(ledger.remove_entry(d, MealSlot::Lunch, "missing").is_none());
        assert!(ledger.remove_entry(day("2024-07-01"), MealSlot::Lunch, "x").is_none());
        assert_eq!(ledger, before);
    }

    #[test]
    fn water_and_weight_replace_fields() {
        let mut ledger = Ledger::new();
        let d = day("2024-06-01");
        ledger.set_water(d, 3);
        ledger.set_water(d, 5);
        ledger.set_weight(d, Some(71.2));
        let record = ledger.get(&d).unwrap();
        assert_eq!(record.water_count, 5);
        assert_eq!(record.weight_sample, Some(71.2));

        ledger.set_weight(d, None);
        assert_eq!(ledger.get(&d).unwrap().weight_sample, None);
    }
}
