//! Context builder for the priority engine
//!
//! Aggregates the event log, journey state, momentum/pattern computations,
//! and recent recommendation history into one structured snapshot. Every
//! layer degrades independently: a failing query logs and falls back to its
//! default so the caller always receives a well-formed context.

use crate::metrics::{compute_48h_metrics, parse_event_ts};
use crate::storage::Storage;
use crate::types::{
    BlockedItem, ContextSnapshot, EnergyLevel, EnrichedIssue, Event, IssuePriority, JourneyState,
    MetricsData, MomentumData, PrStatus, TimeContext, WorkPatterns,
};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Number of recent raw events included for display
const RECENT_EVENTS_LIMIT: usize = 20;

/// Stored recommendations pulled in for narrative continuity
const RECENT_RECOMMENDATIONS_LIMIT: usize = 5;

/// Builds the layered context snapshot consumed by the priority engine.
pub struct ContextBuilder {
    storage: Arc<dyn Storage>,
    local_utc_offset_hours: i32,
}

impl ContextBuilder {
    pub fn new(storage: Arc<dyn Storage>, local_utc_offset_hours: i32) -> Self {
        Self {
            storage,
            local_utc_offset_hours,
        }
    }

    /// Build the full context. Never fails: individual layers degrade to
    /// their defaults, and `fallback_context` covers the pathological case
    /// where a caller needs a context without touching storage at all.
    pub async fn build_context(&self, journey_id: Option<&str>) -> ContextSnapshot {
        let now = Utc::now();

        let metrics = self.get_48h_metrics(now).await.unwrap_or_else(|e| {
            warn!("Failed to get 48h metrics: {}", e);
            MetricsData::default()
        });

        let recent_events = self
            .storage
            .recent_events(RECENT_EVENTS_LIMIT)
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to get recent events: {}", e);
                Vec::new()
            });

        let active_issues = self.get_enriched_issues(now).await.unwrap_or_else(|e| {
            warn!("Failed to get enriched issues: {}", e);
            Vec::new()
        });

        let blocked_items = self.get_blocked_items(now).await.unwrap_or_else(|e| {
            warn!("Failed to get blocked items: {}", e);
            Vec::new()
        });

        let pr_status = self.get_pr_review_status(now).await.unwrap_or_else(|e| {
            warn!("Failed to get PR review status: {}", e);
            Vec::new()
        });

        let journey = self.get_journey_state(journey_id).await;

        let momentum = self.calculate_momentum(now).await.unwrap_or_else(|e| {
            warn!("Failed to calculate momentum: {}", e);
            MomentumData::unknown()
        });

        let patterns = self.get_work_patterns(now).await.unwrap_or_else(|e| {
            warn!("Failed to get work patterns: {}", e);
            WorkPatterns::default()
        });

        let time_context = self.get_time_context(now);

        let recent_recommendations = self
            .storage
            .recent_recommendations(RECENT_RECOMMENDATIONS_LIMIT)
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to get recent recommendations: {}", e);
                Vec::new()
            });

        info!("Built context successfully");

        ContextSnapshot {
            metrics,
            recent_events,
            active_issues,
            blocked_items,
            pr_status,
            journey,
            momentum,
            patterns,
            time_context,
            recent_recommendations,
        }
    }

    /// Minimal hardcoded context: all-zero metrics, empty lists, default
    /// journey, computed time context.
    pub fn fallback_context(&self) -> ContextSnapshot {
        ContextSnapshot {
            metrics: MetricsData::default(),
            recent_events: Vec::new(),
            active_issues: Vec::new(),
            blocked_items: Vec::new(),
            pr_status: Vec::new(),
            journey: JourneyState::default_journey(),
            momentum: MomentumData::unknown(),
            patterns: WorkPatterns::default(),
            time_context: self.get_time_context(Utc::now()),
            recent_recommendations: Vec::new(),
        }
    }

    async fn get_48h_metrics(&self, now: DateTime<Utc>) -> crate::error::Result<MetricsData> {
        let events = self.storage.events_since(now - Duration::hours(48)).await?;
        Ok(compute_48h_metrics(&events))
    }

    async fn get_enriched_issues(
        &self,
        now: DateTime<Utc>,
    ) -> crate::error::Result<Vec<EnrichedIssue>> {
        let events = self
            .storage
            .latest_issue_events(now - Duration::days(7))
            .await?;
        Ok(events.iter().map(|e| enrich_issue(e, now)).collect())
    }

    async fn get_blocked_items(
        &self,
        now: DateTime<Utc>,
    ) -> crate::error::Result<Vec<BlockedItem>> {
        let events = self
            .storage
            .blocked_issue_events(now - Duration::days(7))
            .await?;
        Ok(events.iter().map(blocked_item_from_event).collect())
    }

    async fn get_pr_review_status(
        &self,
        now: DateTime<Utc>,
    ) -> crate::error::Result<Vec<PrStatus>> {
        let events = self
            .storage
            .open_pr_events(now - Duration::days(7))
            .await?;
        Ok(events.iter().map(|e| pr_status_from_event(e, now)).collect())
    }

    async fn get_journey_state(&self, journey_id: Option<&str>) -> JourneyState {
        let lookup = match journey_id {
            Some(id) => self.storage.journey_by_id(id).await,
            None => self.storage.active_journey().await,
        };

        match lookup {
            Ok(Some(journey)) => journey,
            Ok(None) => JourneyState::default_journey(),
            Err(e) => {
                warn!("Failed to get journey state: {}", e);
                JourneyState::default_journey()
            }
        }
    }

    async fn calculate_momentum(&self, now: DateTime<Utc>) -> crate::error::Result<MomentumData> {
        let recent = self
            .storage
            .count_events_between(now - Duration::days(3), now)
            .await?;
        let previous = self
            .storage
            .count_events_between(now - Duration::days(6), now - Duration::days(3))
            .await?;

        Ok(MomentumData::classify(recent, previous))
    }

    async fn get_work_patterns(&self, now: DateTime<Utc>) -> crate::error::Result<WorkPatterns> {
        let buckets = self
            .storage
            .event_counts_by_hour(now - Duration::days(30))
            .await?;

        if buckets.is_empty() {
            return Ok(WorkPatterns::default());
        }

        let peak_hours: Vec<u32> = buckets.iter().take(3).map(|(hour, _)| *hour).collect();
        Ok(WorkPatterns {
            most_productive_hour: peak_hours[0],
            pattern_confidence: buckets.len() as f64 / 24.0,
            peak_hours,
        })
    }

    fn get_time_context(&self, now: DateTime<Utc>) -> TimeContext {
        time_context_at(now, self.local_utc_offset_hours)
    }
}

/// Annotate a latest-per-issue event with age, priority, and state.
fn enrich_issue(event: &Event, now: DateTime<Utc>) -> EnrichedIssue {
    let days_old = parse_event_ts(&event.ts)
        .map(|ts| (now - ts).num_seconds().max(0) as f64 / 86_400.0)
        .unwrap_or(0.0);

    EnrichedIssue {
        ref_id: event.ref_id.clone(),
        title: event.title.clone(),
        url: event.url.clone(),
        days_old,
        last_updated: Some(event.ts.clone()),
        priority: extract_priority(&event.meta),
        state: extract_state(&event.meta),
    }
}

fn blocked_item_from_event(event: &Event) -> BlockedItem {
    let reason = event
        .meta
        .get("blocked_reason")
        .and_then(|r| r.as_str())
        .unwrap_or("No reason specified")
        .to_string();

    BlockedItem {
        ref_id: event.ref_id.clone(),
        title: event.title.clone(),
        url: event.url.clone(),
        blocked_since: Some(event.ts.clone()),
        reason,
    }
}

/// Flag a PR as needing review when strictly older than 24 hours.
fn pr_status_from_event(event: &Event, now: DateTime<Utc>) -> PrStatus {
    let hours_old = parse_event_ts(&event.ts)
        .map(|ts| (now - ts).num_seconds().max(0) as f64 / 3_600.0)
        .unwrap_or(0.0);

    PrStatus {
        ref_id: event.ref_id.clone(),
        title: event.title.clone(),
        url: event.url.clone(),
        hours_old,
        needs_review: hours_old > 24.0,
        opened_at: Some(event.ts.clone()),
    }
}

/// Decode the issue priority from event metadata.
///
/// Linear ingestion stores the numeric code directly under `priority`;
/// webhook-shaped payloads nest it under `priority.value`. Missing or
/// unmapped codes read as normal.
fn extract_priority(meta: &serde_json::Value) -> IssuePriority {
    let code = meta
        .get("priority")
        .and_then(|p| p.as_i64().or_else(|| p.get("value").and_then(|v| v.as_i64())))
        .unwrap_or(3);
    IssuePriority::from_code(code)
}

fn extract_state(meta: &serde_json::Value) -> String {
    meta.get("state")
        .and_then(|s| s.get("name"))
        .and_then(|n| n.as_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Compute the time-of-day context at a fixed UTC offset (no DST handling).
fn time_context_at(now: DateTime<Utc>, offset_hours: i32) -> TimeContext {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    let local = now.with_timezone(&offset);
    let hour = local.hour();

    let work_day_remaining = if hour < 17 {
        (17 - hour as i32).max(0) as f64
    } else {
        0.0
    };

    TimeContext {
        current_utc: now.to_rfc3339(),
        local_time: local.to_rfc3339(),
        hour_of_day: hour,
        is_work_hours: (9..=17).contains(&hour),
        work_day_remaining,
        energy_level: EnergyLevel::from_hour(hour),
        day_of_week: local.format("%A").to_string(),
        is_weekend: local.weekday().number_from_monday() >= 6,
    }
}
