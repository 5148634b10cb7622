//! Gemini-backed [`Estimator`].
//!
//! Calls `generateContent` with a JSON response schema so the model answers
//! with `FoodEstimate` objects directly.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use super::gateway::{EstimationError, Estimator, FoodEstimate};
use crate::config::GeminiConfig;

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const IMAGE_PROMPT: &str = "Identify the food in this photo. Estimate its total calories, \
     protein, carbs and fat in grams, and describe a typical serving size.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

fn estimate_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "foodName": { "type": "STRING", "description": "Name of the food" },
            "estimatedCalories": { "type": "NUMBER", "description": "Estimated calorie count" },
            "protein": { "type": "NUMBER", "description": "Grams of protein" },
            "carbs": { "type": "NUMBER", "description": "Grams of carbohydrates" },
            "fat": { "type": "NUMBER", "description": "Grams of fat" },
            "servingDescription": { "type": "STRING", "description": "Typical serving size" }
        },
        "required": ["foodName", "estimatedCalories", "protein", "carbs", "fat", "servingDescription"],
        "propertyOrdering": ["foodName", "estimatedCalories", "protein", "carbs", "fat", "servingDescription"]
    })
}

fn text_prompt(description: &str) -> String {
    format!(
        "Parse this food diary entry: \"{description}\". List every food item with its \
         estimated calories, protein (g), carbs (g), fat (g) and serving size."
    )
}

pub struct GeminiEstimator {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiEstimator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build gemini http client")?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &GeminiConfig) -> anyhow::Result<Option<Self>> {
        config
            .api_key
            .as_ref()
            .map(|key| {
                Self::new(
                    key.clone(),
                    config.model.clone(),
                    Duration::from_secs(config.timeout_secs),
                )
            })
            .transpose()
    }

    fn build_url(&self) -> String {
        format!(
            "{API_BASE_URL}/models/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }

    async fn generate(&self, request: &GeminiRequest) -> Result<String, EstimationError> {
        let response = self
            .client
            .post(self.build_url())
            .json(request)
            .send()
            .await
            .map_err(|e| EstimationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EstimationError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            error!(%status, "gemini api error");
            return Err(map_api_error(status.as_u16(), &body));
        }
        extract_text(&body)
    }
}

impl fmt::Debug for GeminiEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiEstimator")
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

fn image_request(image: &[u8], mime_type: &str) -> GeminiRequest {
    GeminiRequest {
        contents: vec![GeminiContent {
            parts: vec![
                ContentPart::InlineData {
                    inline_data: InlineData {
                        mime_type: mime_type.to_string(),
                        data: STANDARD.encode(image),
                    },
                },
                ContentPart::Text {
                    text: IMAGE_PROMPT.to_string(),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: estimate_schema(),
        },
    }
}

fn text_request(description: &str) -> GeminiRequest {
    GeminiRequest {
        contents: vec![GeminiContent {
            parts: vec![ContentPart::Text {
                text: text_prompt(description),
            }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: json!({ "type": "ARRAY", "items": estimate_schema() }),
        },
    }
}

fn map_api_error(status: u16, body: &str) -> EstimationError {
    let message = serde_json::from_str::<GeminiResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .map_or_else(|| body.to_string(), |e| e.message);
    EstimationError::Status { status, message }
}

/// Concatenated text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, EstimationError> {
    let response: GeminiResponse =
        serde_json::from_str(body).map_err(|e| EstimationError::Parse(e.to_string()))?;
    if let Some(err) = response.error {
        return Err(EstimationError::Status {
            status: 200,
            message: err.message,
        });
    }
    let text: String = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text),
                    ContentPart::InlineData { .. } => None,
                })
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(EstimationError::EmptyResponse);
    }
    Ok(text)
}

/// Removes a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    lazy_static! {
        static ref FENCE_RE: Regex = Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").unwrap();
    }
    FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text.trim(), |m| m.as_str())
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, EstimationError> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| EstimationError::Parse(e.to_string()))
}

fn check_named(estimate: &FoodEstimate) -> Result<(), EstimationError> {
    if estimate.food_name.trim().is_empty() {
        return Err(EstimationError::Parse("estimate without a food name".into()));
    }
    Ok(())
}

fn parse_single(text: &str) -> Result<FoodEstimate, EstimationError> {
    let estimate: FoodEstimate = parse_json(text)?;
    check_named(&estimate)?;
    Ok(estimate)
}

fn parse_list(text: &str) -> Result<Vec<FoodEstimate>, EstimationError> {
    let estimates: Vec<FoodEstimate> = parse_json(text)?;
    estimates.iter().try_for_each(check_named)?;
    Ok(estimates)
}

#[async_trait]
impl Estimator for GeminiEstimator {
    #[instrument(skip(self, image), fields(model = %self.model, bytes = image.len()))]
    async fn estimate_from_image(
        &self,
        image: Bytes,
        mime_type: &str,
    ) -> Result<FoodEstimate, EstimationError> {
        let text = self.generate(&image_request(&image, mime_type)).await?;
        let estimate = parse_single(&text)?;
        debug!(food = %estimate.food_name, "image estimated");
        Ok(estimate)
    }

    #[instrument(skip(self, description), fields(model = %self.model))]
    async fn estimate_from_text(
        &self,
        description: &str,
    ) -> Result<Vec<FoodEstimate>, EstimationError> {
        let text = self.generate(&text_request(description)).await?;
        let estimates = parse_list(&text)?;
        debug!(count = estimates.len(), "text estimated");
        Ok(estimates)
    }
}
