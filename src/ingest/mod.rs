//! External-source ingestion
//!
//! Pulls raw activity from GitHub and Linear, normalizes it to the common
//! event schema, and inserts idempotently. Per-event insert failures are
//! counted as skipped rather than aborting the batch.

pub mod github;
pub mod linear;

pub use github::GithubIngestor;
pub use linear::LinearIngestor;

use crate::storage::Storage;
use crate::types::{Event, InsertOutcome};
use serde::Serialize;
use tracing::error;

/// Result of one ingest run, shaped for the `/ingest/run` response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestOutcome {
    pub inserted: u64,
    pub skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_generated: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<Event>>,
}

/// Insert a batch of events, counting outcomes. A failed insert logs, counts
/// as skipped, and bumps the failure counter; it never aborts the batch.
pub(crate) async fn store_events(
    storage: &dyn Storage,
    events: &[Event],
) -> (u64, u64, u64) {
    let mut inserted = 0;
    let mut skipped = 0;
    let mut failures = 0;

    for event in events {
        match storage.insert_event(event).await {
            Ok(InsertOutcome::Inserted) => inserted += 1,
            Ok(InsertOutcome::Duplicate) => skipped += 1,
            Err(e) => {
                error!("Failed to insert event {}: {}", event.ref_id, e);
                skipped += 1;
                failures += 1;
            }
        }
    }

    (inserted, skipped, failures)
}
