use serde::Serialize;

use super::model::{Draft, GoalProfile};
use super::services::Recommendation;

#[derive(Debug, Serialize)]
pub struct GoalsView {
    pub active: GoalProfile,
    pub draft: Draft<GoalProfile>,
    pub dirty: bool,
}

#[derive(Debug, Serialize)]
pub struct RecalculateResponse {
    pub draft: Draft<GoalProfile>,
    pub recommendation: Recommendation,
}
