//! Derived views over the ledger: per-day totals, the logging streak and the
//! dashboard summary. Everything here is a pure function of its inputs.

use serde::Serialize;

use crate::day_key::DayKey;
use crate::goals::model::GoalProfile;
use crate::ledger::repo::Ledger;
use crate::ledger::repo_types::{DayRecord, FoodEntry, MealSlot};

/// Hydration target shown next to the water counter.
pub const WATER_GOAL_CUPS: u32 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

pub fn daily_totals(record: &DayRecord) -> Totals {
    record
        .meals
        .entries()
        .fold(Totals::default(), |acc, entry| Totals {
            calories: acc.calories + finite_or_zero(entry.calories),
            protein: acc.protein + finite_or_zero(entry.protein),
            carbs: acc.carbs + finite_or_zero(entry.carbs),
            fat: acc.fat + finite_or_zero(entry.fat),
        })
}

/// Consecutive logged days ending at `today`.
///
/// An unlogged `today` does not break the streak while `yesterday` is
/// logged: counting then starts from yesterday. Only that single day of
/// grace is given.
pub fn streak(ledger: &Ledger, today: DayKey) -> u32 {
    if ledger.is_empty() {
        return 0;
    }
    let logged = |day: &DayKey| ledger.get(day).is_some_and(DayRecord::has_entries);

    let mut count = 0;
    let mut cursor = Some(today);
    while let Some(day) = cursor {
        if logged(&day) {
            count += 1;
            cursor = day.previous();
            continue;
        }
        if day != today {
            break;
        }
        cursor = day.previous();
        if !cursor.as_ref().is_some_and(|yesterday| logged(yesterday)) {
            break;
        }
    }
    count
}

/// `value` as a percentage of `goal`, capped at 100. Zero goal reads as 0%.
fn capped_percent(value: f64, goal: f64) -> f64 {
    if goal <= 0.0 || !goal.is_finite() {
        return 0.0;
    }
    (value / goal * 100.0).clamp(0.0, 100.0)
}

/// How far the current weight has moved from the starting weight towards the target, 0..=100.
pub fn weight_progress(goal: &GoalProfile) -> f64 {
    let total = (goal.starting_weight - goal.target_weight).abs();
    let remaining = (goal.current_weight - goal.target_weight).abs();
    if total == 0.0 {
        return if remaining == 0.0 { 100.0 } else { 0.0 };
    }
    (100.0 - remaining / total * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroProgress {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub meal: MealSlot,
    pub entry: FoodEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub day_key: DayKey,
    pub is_today: bool,
    pub totals: Totals,
    pub daily_calorie_budget: u32,
    pub remaining_calories: f64,
    pub is_over: bool,
    pub calorie_progress: f64,
    pub macro_progress: MacroProgress,
    pub water_count: u32,
    pub water_goal: u32,
    pub water_progress: f64,
    pub weight_sample: Option<f64>,
    pub weight_progress: f64,
    pub streak: u32,
    /// Day's entries, most recently logged slot position first.
    pub history: Vec<HistoryItem>,
}

pub fn day_summary(ledger: &Ledger, goal: &GoalProfile, day: DayKey, today: DayKey) -> DaySummary {
    let record = ledger.get_or_create(day);
    let totals = daily_totals(&record);
    let budget = f64::from(goal.daily_calorie_budget);
    let remaining = budget - totals.calories;

    let mut history: Vec<HistoryItem> = record
        .meals
        .iter()
        .flat_map(|(meal, entries)| {
            entries.iter().map(move |entry| HistoryItem {
                meal,
                entry: entry.clone(),
            })
        })
        .collect();
    history.reverse();

    DaySummary {
        day_key: day,
        is_today: day == today,
        totals,
        daily_calorie_budget: goal.daily_calorie_budget,
        remaining_calories: remaining,
        is_over: remaining < 0.0,
        calorie_progress: capped_percent(totals.calories, budget),
        macro_progress: MacroProgress {
            protein: capped_percent(totals.protein, f64::from(goal.nutrient_goals.protein)),
            carbs: capped_percent(totals.carbs, f64::from(goal.nutrient_goals.carbs)),
            fat: capped_percent(totals.fat, f64::from(goal.nutrient_goals.fat)),
        },
        water_count: record.water_count,
        water_goal: WATER_GOAL_CUPS,
        water_progress: capped_percent(f64::from(record.water_count), f64::from(WATER_GOAL_CUPS)),
        weight_sample: record.weight_sample,
        weight_progress: weight_progress(goal),
        streak: streak(ledger, today),
        history,
    }
}
