use serde::{Deserialize, Serialize};

use crate::numeric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    Extra,
}

impl ActivityLevel {
    /// TDEE multiplier applied to the basal estimate.
    pub fn multiplier(&self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::Extra => 1.9,
        }
    }
}

/// Daily macro targets in grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutrientGoals {
    pub protein: u32,
    pub carbs: u32,
    pub fat: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProfile {
    #[serde(alias = "dailyBudget")]
    pub daily_calorie_budget: u32,
    pub starting_weight: f64,
    pub current_weight: f64,
    pub target_weight: f64,
    pub height: f64,
    pub age: u32,
    pub gender: Gender,
    pub activity_level: ActivityLevel,
    pub nutrient_goals: NutrientGoals,
}

impl Default for GoalProfile {
    fn default() -> Self {
        Self {
            daily_calorie_budget: 2000,
            starting_weight: 80.0,
            current_weight: 75.5,
            target_weight: 70.0,
            height: 175.0,
            age: 28,
            gender: Gender::Male,
            activity_level: ActivityLevel::Moderate,
            nutrient_goals: NutrientGoals {
                protein: 150,
                carbs: 225,
                fat: 55,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NutrientGoalsPatch {
    #[serde(default, deserialize_with = "numeric::lenient_u32")]
    pub protein: Option<u32>,
    #[serde(default, deserialize_with = "numeric::lenient_u32")]
    pub carbs: Option<u32>,
    #[serde(default, deserialize_with = "numeric::lenient_u32")]
    pub fat: Option<u32>,
}

/// Edit of the draft profile. Absent fields are left alone; present but
/// unparsable numbers become zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPatch {
    #[serde(default, alias = "dailyBudget", deserialize_with = "numeric::lenient_u32")]
    pub daily_calorie_budget: Option<u32>,
    #[serde(default, deserialize_with = "numeric::lenient_f64")]
    pub starting_weight: Option<f64>,
    #[serde(default, deserialize_with = "numeric::lenient_f64")]
    pub current_weight: Option<f64>,
    #[serde(default, deserialize_with = "numeric::lenient_f64")]
    pub target_weight: Option<f64>,
    #[serde(default, deserialize_with = "numeric::lenient_f64")]
    pub height: Option<f64>,
    #[serde(default, deserialize_with = "numeric::lenient_u32")]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub activity_level: Option<ActivityLevel>,
    #[serde(default)]
    pub nutrient_goals: Option<NutrientGoalsPatch>,
}

impl GoalPatch {
    /// Single merge point for profile edits.
    pub fn apply_to(&self, profile: &GoalProfile) -> GoalProfile {
        let mut next = profile.clone();
        if let Some(v) = self.daily_calorie_budget {
            next.daily_calorie_budget = v;
        }
        if let Some(v) = self.starting_weight {
            next.starting_weight = v;
        }
        if let Some(v) = self.current_weight {
            next.current_weight = v;
        }
        if let Some(v) = self.target_weight {
            next.target_weight = v;
        }
        if let Some(v) = self.height {
            next.height = v;
        }
        if let Some(v) = self.age {
            next.age = v;
        }
        if let Some(v) = self.gender {
            next.gender = v;
        }
        if let Some(v) = self.activity_level {
            next.activity_level = v;
        }
        if let Some(goals) = &self.nutrient_goals {
            if let Some(v) = goals.protein {
                next.nutrient_goals.protein = v;
            }
            if let Some(v) = goals.carbs {
                next.nutrient_goals.carbs = v;
            }
            if let Some(v) = goals.fat {
                next.nutrient_goals.fat = v;
            }
        }
        next
    }
}

/// An editable copy that can only reach the active value through [`Draft::commit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Draft<T>(T);

impl<T: Clone> Draft<T> {
    pub fn of(active: &T) -> Self {
        Self(active.clone())
    }

    pub fn get(&self) -> &T {
        &self.0
    }

    /// The value that replaces the active one.
    pub fn commit(&self) -> T {
        self.0.clone()
    }
}

impl Draft<GoalProfile> {
    pub fn edit(&mut self, patch: &GoalPatch) {
        self.0 = patch.apply_to(&self.0);
    }

    pub(crate) fn set_budget(&mut self, budget: u32, goals: NutrientGoals) {
        self.0.daily_calorie_budget = budget;
        self.0.nutrient_goals = goals;
    }

    pub(crate) fn set_current_weight(&mut self, weight: f64) {
        self.0.current_weight = weight;
    }
}
