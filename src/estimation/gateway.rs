use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::repo_types::NewEntry;

/// One food item as estimated by the AI service. Every field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodEstimate {
    pub food_name: String,
    pub estimated_calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub serving_description: String,
}

impl From<FoodEstimate> for NewEntry {
    fn from(estimate: FoodEstimate) -> Self {
        NewEntry {
            id: None,
            name: estimate.food_name,
            calories: estimate.estimated_calories,
            protein: estimate.protein,
            carbs: estimate.carbs,
            fat: estimate.fat,
            serving_description: estimate.serving_description,
            created_at: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("food estimation is not configured")]
    Unavailable,
    #[error("estimation request failed: {0}")]
    Transport(String),
    #[error("estimation service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("estimation service returned no content")]
    EmptyResponse,
    #[error("could not parse estimation response: {0}")]
    Parse(String),
}

/// Text or photo in, structured nutrient estimates out.
#[async_trait]
pub trait Estimator: Send + Sync {
    /// A single food item from a photo.
    async fn estimate_from_image(
        &self,
        image: Bytes,
        mime_type: &str,
    ) -> Result<FoodEstimate, EstimationError>;

    /// Zero or more items from a diary sentence. Empty means nothing was recognized.
    async fn estimate_from_text(&self, description: &str)
        -> Result<Vec<FoodEstimate>, EstimationError>;
}

/// Used when no API key is configured; every call fails.
pub struct DisabledEstimator;

#[async_trait]
impl Estimator for DisabledEstimator {
    async fn estimate_from_image(
        &self,
        _image: Bytes,
        _mime_type: &str,
    ) -> Result<FoodEstimate, EstimationError> {
        Err(EstimationError::Unavailable)
    }

    async fn estimate_from_text(
        &self,
        _description: &str,
    ) -> Result<Vec<FoodEstimate>, EstimationError> {
        Err(EstimationError::Unavailable)
    }
}
