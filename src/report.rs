//! Public read-only report
//!
//! Produces a snapshot safe to expose without authentication: current 48h
//! metrics, the most recent recommendation feedback, and recent events
//! stripped of internal metadata. Every section degrades to a safe default
//! on failure.

use crate::metrics::compute_48h_metrics;
use crate::storage::Storage;
use crate::types::MetricsData;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

/// Events included in the public stream
const PUBLIC_EVENTS_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct PublicReport {
    pub as_of: String,
    pub metrics: MetricsData,
    pub feedback: Option<Value>,
    pub recent_events: Vec<Value>,
}

/// Build the public report. Never fails; failing sections degrade.
pub async fn build_public_report(storage: &dyn Storage) -> PublicReport {
    let now = Utc::now();

    let metrics = match storage.events_since(now - Duration::hours(48)).await {
        Ok(events) => compute_48h_metrics(&events),
        Err(e) => {
            warn!("Failed to compute public metrics: {}", e);
            MetricsData::default()
        }
    };

    let feedback = match storage.recent_recommendations(5).await {
        Ok(recommendations) => recommendations
            .into_iter()
            .find(|rec| {
                rec.action_taken.is_some()
                    || rec.outcome.is_some()
                    || rec.feedback_score.is_some()
            })
            .map(|rec| {
                json!({
                    "action_taken": rec.action_taken,
                    "outcome": rec.outcome,
                    "feedback_score": rec.feedback_score,
                    "created_at": rec.created_at,
                })
            }),
        Err(e) => {
            warn!("Failed to fetch latest feedback: {}", e);
            None
        }
    };

    let recent_events = match storage.recent_events(PUBLIC_EVENTS_LIMIT).await {
        Ok(events) => events
            .iter()
            // Strip actor, ref_id, and the raw payload from the public view
            .map(|event| {
                json!({
                    "ts": event.ts,
                    "source": event.source,
                    "type": event.kind,
                    "title": event.title,
                    "url": event.url,
                })
            })
            .collect(),
        Err(e) => {
            warn!("Failed to fetch public events: {}", e);
            Vec::new()
        }
    };

    PublicReport {
        as_of: now.to_rfc3339(),
        metrics,
        feedback,
        recent_events,
    }
}
