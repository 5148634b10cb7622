use serde::{Deserialize, Serialize};

use super::repo_types::{DayRecord, NewEntry};
use crate::aggregation::Totals;
use crate::day_key::DayKey;
use crate::numeric;

#[derive(Debug, Serialize)]
pub struct DayView {
    #[serde(flatten)]
    pub record: DayRecord,
    pub totals: Totals,
}

#[derive(Debug, Deserialize)]
pub struct AddEntriesRequest {
    pub entries: Vec<NewEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WaterRequest {
    #[serde(default, deserialize_with = "numeric::lenient_u32")]
    pub count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WeightRequest {
    #[serde(default, deserialize_with = "numeric::lenient_f64")]
    pub weight: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct StreakResponse {
    pub today: DayKey,
    pub streak: u32,
}
