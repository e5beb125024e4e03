//! Storage layer for the Pulse backend
//!
//! Provides the collaborator interfaces the core consumes (event log,
//! ingest cursors, journeys, recommendations) and their libsql
//! implementation.

pub mod libsql;

use crate::error::Result;
use crate::types::{
    Event, InsertOutcome, JourneyState, RecentRecommendation, RecommendationFeedback,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage backend trait covering all persistent collaborators.
///
/// Grouped into one trait so a single database handle can back everything;
/// the sections mirror the four logical stores.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    // === Event store ===

    /// Insert an event, keyed on `(source, ref_id, type, ts)`.
    /// Re-inserting an existing key is a no-op reported as `Duplicate`.
    async fn insert_event(&self, event: &Event) -> Result<InsertOutcome>;

    /// All events at or after `cutoff`, newest first
    async fn events_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>>;

    /// The most recent events regardless of window, newest first
    async fn recent_events(&self, limit: usize) -> Result<Vec<Event>>;

    /// Latest issue-lifecycle event per Linear ref_id since `cutoff`
    async fn latest_issue_events(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>>;

    /// `ISSUE_BLOCKED` events since `cutoff`, newest first
    async fn blocked_issue_events(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>>;

    /// GitHub `PullRequestEvent_opened` events since `cutoff`, newest first
    async fn open_pr_events(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Count of events with `start <= ts < end`
    async fn count_events_between(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Result<u64>;

    /// `(hour_of_day, count)` buckets since `cutoff`, most active first
    async fn event_counts_by_hour(&self, cutoff: DateTime<Utc>) -> Result<Vec<(u32, u64)>>;

    // === Cursor store ===

    /// Read a cursor, defaulting to `default_hours_ago` before now when the
    /// key has never been written.
    async fn get_cursor(&self, key: &str, default_hours_ago: i64) -> Result<String>;

    /// Advance a cursor. Callers are responsible for monotonicity.
    async fn set_cursor(&self, key: &str, value: &str) -> Result<()>;

    // === Journey store ===

    async fn journey_by_id(&self, id: &str) -> Result<Option<JourneyState>>;

    /// The most recently created journey flagged active
    async fn active_journey(&self) -> Result<Option<JourneyState>>;

    // === Recommendation store ===

    /// Persist a generated recommendation; returns the new row id.
    async fn insert_recommendation(
        &self,
        journey_id: Option<String>,
        context_id: &str,
        context_snapshot: &serde_json::Value,
        recommendation: &serde_json::Value,
    ) -> Result<String>;

    /// Attach feedback to the recommendation whose context id matches.
    /// Returns the updated row id, or `None` when nothing matched.
    async fn update_feedback(
        &self,
        context_id: &str,
        feedback: &RecommendationFeedback,
    ) -> Result<Option<String>>;

    /// The last `limit` stored recommendations with any recorded feedback
    async fn recent_recommendations(&self, limit: usize) -> Result<Vec<RecentRecommendation>>;

    // === Health ===

    async fn health_check(&self) -> Result<()>;
}
