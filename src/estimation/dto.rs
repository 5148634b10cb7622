use serde::{Deserialize, Serialize};

use super::sessions::AnalysisSession;
use crate::ledger::repo_types::FoodEntry;

/// `day` takes `YYYY-MM-DD` or `today`; `slot` is case-insensitive.
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub day: String,
    pub slot: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeTextRequest {
    #[serde(default)]
    pub description: String,
}

/// Photo as a base64 string, for clients that cannot send multipart.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeImageBase64 {
    pub image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub recognized: bool,
    pub session: AnalysisSession,
    pub entries: Vec<FoodEntry>,
}
