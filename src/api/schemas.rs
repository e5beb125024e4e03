//! Request/response schemas for the HTTP API

use crate::types::{Event, MetricsData};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct GithubIngestConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub since_iso: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestRunRequest {
    #[serde(default)]
    pub github: Option<GithubIngestConfig>,
    #[serde(default)]
    pub linear: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestRunParams {
    #[serde(rename = "dryRun", default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JourneyParams {
    #[serde(default)]
    pub journey_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub metrics: MetricsData,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityFeedbackRequest {
    pub recommendation_id: String,
    #[serde(default)]
    pub action_taken: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub feedback_score: Option<i64>,
    #[serde(default)]
    pub time_to_complete_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackResponse {
    pub message: String,
    pub recommendation_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}
