use serde::Serialize;

use super::model::{Draft, Gender, GoalProfile, NutrientGoals};

pub const MIN_DAILY_BUDGET: u32 = 1200;
const LOSS_DEFICIT_KCAL: f64 = 500.0;
const GAIN_SURPLUS_KCAL: f64 = 300.0;

const PROTEIN_SHARE: f64 = 0.30;
const CARBS_SHARE: f64 = 0.45;
const FAT_SHARE: f64 = 0.25;
const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub daily_calorie_budget: u32,
    pub nutrient_goals: NutrientGoals,
}

/// Mifflin-St Jeor basal estimate.
fn basal_metabolic_rate(profile: &GoalProfile) -> f64 {
    let base = 10.0 * profile.current_weight + 6.25 * profile.height - 5.0 * f64::from(profile.age);
    match profile.gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
    }
}

/// Budget and macro split for the draft's biometrics. Reads the draft only.
pub fn recommend_budget(draft: &Draft<GoalProfile>) -> Recommendation {
    let profile = draft.get();
    let tdee = basal_metabolic_rate(profile) * profile.activity_level.multiplier();
    let raw = if profile.current_weight > profile.target_weight {
        tdee - LOSS_DEFICIT_KCAL
    } else {
        tdee + GAIN_SURPLUS_KCAL
    };
    let budget = round_to_u32(raw).max(MIN_DAILY_BUDGET);

    Recommendation {
        daily_calorie_budget: budget,
        nutrient_goals: macro_split(budget),
    }
}

pub fn macro_split(budget: u32) -> NutrientGoals {
    let kcal = f64::from(budget);
    NutrientGoals {
        protein: round_to_u32(kcal * PROTEIN_SHARE / KCAL_PER_G_PROTEIN),
        carbs: round_to_u32(kcal * CARBS_SHARE / KCAL_PER_G_CARBS),
        fat: round_to_u32(kcal * FAT_SHARE / KCAL_PER_G_FAT),
    }
}

fn round_to_u32(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}
