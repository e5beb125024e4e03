//! HTTP API server
//!
//! Exposes the recommendation, ingest, journey, analyze, report, and health
//! endpoints over axum. Handlers stay thin: validation and status mapping
//! here, behavior in the core modules.

use super::schemas::{
    AnalyzeResponse, ErrorResponse, FeedbackResponse, HealthResponse, IngestRunParams,
    IngestRunRequest, JourneyParams, PriorityFeedbackRequest,
};
use crate::config::Settings;
use crate::engine::PriorityEngine;
use crate::error::PulseError;
use crate::ingest::{GithubIngestor, IngestOutcome, LinearIngestor};
use crate::metrics::{compute_48h_metrics, filter_recent_events};
use crate::report::{build_public_report, PublicReport};
use crate::storage::Storage;
use crate::types::{JourneyState, PriorityRecommendation, RecommendationFeedback};
use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server address
    pub addr: SocketAddr,
    /// Allowed CORS origin
    pub cors_origin: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 8000).into(),
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

/// API server state shared across handlers
#[derive(Clone)]
struct AppState {
    storage: Arc<dyn Storage>,
    engine: Arc<PriorityEngine>,
    settings: Arc<Settings>,
}

/// Error wrapper mapping core errors to HTTP statuses
#[derive(Debug)]
struct ApiError(PulseError);

impl From<PulseError> for ApiError {
    fn from(err: PulseError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PulseError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PulseError::NotFound(_) => StatusCode::NOT_FOUND,
            PulseError::Http(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            PulseError::Http(e) if e.is_connect() => StatusCode::SERVICE_UNAVAILABLE,
            PulseError::Http(_) | PulseError::ExternalApi { .. } => StatusCode::BAD_GATEWAY,
            PulseError::LlmTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(
        config: ApiServerConfig,
        storage: Arc<dyn Storage>,
        engine: Arc<PriorityEngine>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            config,
            state: AppState {
                storage,
                engine,
                settings,
            },
        }
    }

    /// Build the router with CORS and request tracing layers.
    fn build_router(state: AppState, cors_origin: &str) -> Router {
        let cors = match cors_origin.parse::<HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => CorsLayer::permissive(),
        };

        Router::new()
            .route("/priority/generate", post(generate_priority_handler))
            .route("/priority/feedback", post(priority_feedback_handler))
            .route("/journey/state", get(journey_state_handler))
            .route("/ingest/run", post(ingest_run_handler))
            .route("/analyze", post(analyze_handler))
            .route("/report/public", get(public_report_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Start serving on the configured address.
    pub async fn serve(self) -> anyhow::Result<()> {
        let router = Self::build_router(self.state, &self.config.cors_origin);

        let listener = tokio::net::TcpListener::bind(self.config.addr).await?;
        info!("API server listening on http://{}", self.config.addr);
        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// Generate a priority recommendation.
///
/// Never hard-fails under normal operation: the engine degrades internally,
/// and a storage failure while persisting the result is logged and swallowed
/// because the response content does not depend on it.
async fn generate_priority_handler(
    State(state): State<AppState>,
    Query(params): Query<JourneyParams>,
) -> Json<PriorityRecommendation> {
    let recommendation = state
        .engine
        .generate_recommendation(params.journey_id.as_deref())
        .await;

    store_recommendation(&state, &recommendation, params.journey_id).await;

    Json(recommendation)
}

/// Persist a generated recommendation for offline learning, best-effort.
async fn store_recommendation(
    state: &AppState,
    recommendation: &PriorityRecommendation,
    journey_id: Option<String>,
) {
    let journey_id = match journey_id {
        Some(id) => Some(id),
        None => state
            .storage
            .active_journey()
            .await
            .ok()
            .flatten()
            .map(|journey| journey.id),
    };

    let context_snapshot = json!({
        "context_id": recommendation.context_id,
        "generated_at": recommendation.generated_at,
        "debug_info": recommendation.debug_info,
    });
    let recommendations = json!({
        "primary_action": recommendation.primary_action,
        "alternatives": recommendation.alternatives,
        "context_summary": recommendation.context_summary,
        "journey_alignment": recommendation.journey_alignment,
        "momentum_insight": recommendation.momentum_insight,
        "energy_match": recommendation.energy_match,
    });

    if let Err(e) = state
        .storage
        .insert_recommendation(
            journey_id,
            &recommendation.context_id,
            &context_snapshot,
            &recommendations,
        )
        .await
    {
        error!("Failed to store recommendation: {}", e);
    }
}

/// Record feedback on a stored recommendation.
///
/// The client-supplied id matches the recommendation's context id.
async fn priority_feedback_handler(
    State(state): State<AppState>,
    Json(request): Json<PriorityFeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let feedback = RecommendationFeedback {
        action_taken: request.action_taken,
        outcome: request.outcome,
        feedback_score: request.feedback_score,
        time_to_complete_minutes: request.time_to_complete_minutes,
    };

    match state
        .storage
        .update_feedback(&request.recommendation_id, &feedback)
        .await?
    {
        Some(id) => Ok(Json(FeedbackResponse {
            message: "Feedback recorded successfully".to_string(),
            recommendation_id: id,
        })),
        None => Err(PulseError::NotFound("Recommendation not found".to_string()).into()),
    }
}

/// Get the requested (or active) journey.
async fn journey_state_handler(
    State(state): State<AppState>,
    Query(params): Query<JourneyParams>,
) -> Result<Json<JourneyState>, ApiError> {
    let journey = match params.journey_id.as_deref() {
        Some(id) => state.storage.journey_by_id(id).await?,
        None => state.storage.active_journey().await?,
    };

    match journey {
        Some(journey) => Ok(Json(journey)),
        None => Err(PulseError::NotFound("Journey not found".to_string()).into()),
    }
}

/// Run ingestion from the requested source. GitHub takes precedence when
/// both are supplied.
async fn ingest_run_handler(
    State(state): State<AppState>,
    Query(params): Query<IngestRunParams>,
    Json(request): Json<IngestRunRequest>,
) -> Result<Json<IngestOutcome>, ApiError> {
    if request.github.is_none() && request.linear.is_none() {
        return Err(
            PulseError::InvalidRequest("No ingest sources specified".to_string()).into(),
        );
    }

    if let Some(github) = request.github {
        let token = state.settings.gh_token.clone().ok_or_else(|| {
            PulseError::InvalidRequest("GH_TOKEN environment variable is required".to_string())
        })?;

        let ingester = GithubIngestor::new(token, state.storage.clone());
        let outcome = ingester
            .ingest(&github.owner, &github.repo, github.since_iso.as_deref())
            .await?;
        return Ok(Json(outcome));
    }

    if request.linear == Some(true) {
        let api_key = state.settings.linear_api_key.clone().ok_or_else(|| {
            PulseError::InvalidRequest(
                "LINEAR_API_KEY environment variable is required".to_string(),
            )
        })?;
        let team_id = state.settings.linear_team_id.clone().ok_or_else(|| {
            PulseError::InvalidRequest(
                "LINEAR_TEAM_ID environment variable is required".to_string(),
            )
        })?;

        let ingester = LinearIngestor::new(api_key, team_id, state.storage.clone());
        let outcome = ingester.ingest(params.dry_run).await?;
        return Ok(Json(outcome));
    }

    Err(PulseError::InvalidRequest("No ingest sources specified".to_string()).into())
}

/// Compute metrics and recent events over the trailing 48 hours.
async fn analyze_handler(
    State(state): State<AppState>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let events = state
        .storage
        .events_since(Utc::now() - Duration::hours(48))
        .await?;

    let metrics = compute_48h_metrics(&events);
    let events = filter_recent_events(events, 50);

    Ok(Json(AnalyzeResponse { metrics, events }))
}

/// Read-only public report.
async fn public_report_handler(State(state): State<AppState>) -> Json<PublicReport> {
    Json(build_public_report(state.storage.as_ref()).await)
}

/// Health check with database status.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.storage.health_check().await {
        Ok(()) => json!({"status": "healthy"}),
        Err(e) => json!({"status": "unhealthy", "error": e.to_string()}),
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    })
}
