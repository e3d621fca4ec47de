use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Score above which produce is labelled rotten.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Rotten,
}

impl Freshness {
    /// Strict threshold: a score equal to `threshold` is still fresh.
    pub fn from_score(score: f32, threshold: f32) -> Self {
        if score > threshold {
            Freshness::Rotten
        } else {
            Freshness::Fresh
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PredictRequest {
    #[serde(default)]
    pub image_base64: Option<String>,
}

/// `confidence` is the raw model output, not the certainty in `result`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictResponse {
    pub result: Freshness,
    pub confidence: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReloadResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelStatus {
    pub path: String,
    pub sha256: String,
    pub loaded_at: DateTime<Utc>,
    pub generation: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub model: ModelStatus,
}
