//! Core data types for the Pulse backend
//!
//! This module defines the fundamental data structures used throughout pulse:
//! normalized activity events, journey state, the layered context snapshot
//! consumed by the priority engine, and the recommendation output types.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Origin of a normalized activity event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Github,
    Linear,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Github => "github",
            EventSource::Linear => "linear",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "github" => Some(EventSource::Github),
            "linear" => Some(EventSource::Linear),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized activity record from GitHub or Linear.
///
/// `ts` stays a string at the model level: upstream payloads carry timestamps
/// in several shapes (`Z` suffix, explicit offsets, occasionally garbage) and
/// the metrics contract requires tolerating unparseable values rather than
/// rejecting the event. Parsing happens at use sites.
///
/// `(source, ref_id, kind, ts)` is the natural idempotency key; re-ingesting
/// the same external event must not create a duplicate row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: String,
    pub source: EventSource,
    pub actor: Option<String>,
    /// Source-specific type tag, e.g. `PullRequestEvent_opened` or `ISSUE_BLOCKED`
    #[serde(rename = "type")]
    pub kind: String,
    pub ref_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    /// Raw upstream payload, preserved verbatim
    #[serde(default)]
    pub meta: Value,
}

/// Outcome of an idempotent event insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The `(source, ref_id, type, ts)` key already existed
    Duplicate,
}

/// Rolling 48-hour engineering metrics.
///
/// `avg_review_hours_48h`, `tickets_moved_48h` and `tickets_blocked_now` are
/// explicit stubs: the upstream signals do not exist yet, but the fields are
/// part of the wire contract and must always be emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsData {
    pub prs_open_48h: u64,
    pub prs_merged_48h: u64,
    pub avg_review_hours_48h: f64,
    pub tickets_moved_48h: u64,
    pub tickets_blocked_now: u64,
}

impl Default for MetricsData {
    fn default() -> Self {
        Self {
            prs_open_48h: 0,
            prs_merged_48h: 0,
            avg_review_hours_48h: 0.0,
            tickets_moved_48h: 0,
            tickets_blocked_now: 0,
        }
    }
}

/// Linear issue priority, decoded from the numeric code in event metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuePriority {
    None,
    Urgent,
    High,
    Normal,
    Low,
}

impl IssuePriority {
    /// Decode Linear's numeric priority. Unmapped codes read as normal.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => IssuePriority::None,
            1 => IssuePriority::Urgent,
            2 => IssuePriority::High,
            3 => IssuePriority::Normal,
            4 => IssuePriority::Low,
            _ => IssuePriority::Normal,
        }
    }

    /// Urgency/importance multiplier used by action enumeration
    pub fn multiplier(&self) -> f64 {
        match self {
            IssuePriority::Urgent => 1.0,
            IssuePriority::High => 0.8,
            IssuePriority::Normal => 0.6,
            IssuePriority::Low => 0.4,
            IssuePriority::None => 0.3,
        }
    }
}

/// A Linear issue annotated with age and metadata-derived priority/state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedIssue {
    pub ref_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub days_old: f64,
    pub last_updated: Option<String>,
    pub priority: IssuePriority,
    pub state: String,
}

/// An issue currently flagged as blocked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedItem {
    pub ref_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub blocked_since: Option<String>,
    pub reason: String,
}

/// An open pull request with aging information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrStatus {
    pub ref_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub hours_old: f64,
    /// Strictly older than 24 hours
    pub needs_review: bool,
    pub opened_at: Option<String>,
}

/// User's target role and timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredState {
    pub role: String,
    pub timeline: String,
    #[serde(default)]
    pub priorities: Vec<String>,
}

/// User's current status and momentum self-assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentState {
    pub status: String,
    pub momentum: String,
    pub current_project: Option<String>,
}

/// Work-hour and energy preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPreferences {
    pub work_hours: String,
    pub energy_pattern: String,
}

impl Default for WorkPreferences {
    fn default() -> Self {
        Self {
            work_hours: "9:00-17:00".to_string(),
            energy_pattern: "morning_peak".to_string(),
        }
    }
}

/// User's stated long-term goal and current status.
///
/// Journeys are mutated externally; the core only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyState {
    pub id: String,
    pub desired_state: DesiredState,
    pub current_state: CurrentState,
    pub preferences: WorkPreferences,
    pub created_at: String,
    pub updated_at: String,
}

impl JourneyState {
    /// Hardcoded journey used when storage has no active journey
    pub fn default_journey() -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: "default".to_string(),
            desired_state: DesiredState {
                role: "$200k+ Staff/Senior Role".to_string(),
                timeline: "3 months".to_string(),
                priorities: vec![
                    "Build impressive portfolio".to_string(),
                    "Demonstrate system design skills".to_string(),
                ],
            },
            current_state: CurrentState {
                status: "building_portfolio".to_string(),
                momentum: "high".to_string(),
                current_project: Some("Pulse AI Priority Engine".to_string()),
            },
            preferences: WorkPreferences::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Activity trend classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentumTrend {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

/// Recent vs. prior activity volume, classified into a trend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumData {
    pub recent_activity: u64,
    pub previous_activity: u64,
    pub velocity_change: f64,
    pub trend: MomentumTrend,
}

impl MomentumData {
    /// Classify a 3-day vs preceding-3-day activity split.
    ///
    /// A fully idle window (both counts zero) is degenerate and reads as
    /// unknown rather than decreasing.
    pub fn classify(recent: u64, previous: u64) -> Self {
        if recent == 0 && previous == 0 {
            return Self {
                recent_activity: 0,
                previous_activity: 0,
                velocity_change: 0.0,
                trend: MomentumTrend::Unknown,
            };
        }

        let velocity_change = if previous == 0 {
            1.0
        } else {
            recent as f64 / previous as f64
        };

        let trend = if velocity_change > 1.2 {
            MomentumTrend::Increasing
        } else if velocity_change < 0.8 {
            MomentumTrend::Decreasing
        } else {
            MomentumTrend::Stable
        };

        Self {
            recent_activity: recent,
            previous_activity: previous,
            velocity_change,
            trend,
        }
    }

    pub fn unknown() -> Self {
        Self {
            recent_activity: 0,
            previous_activity: 0,
            velocity_change: 0.0,
            trend: MomentumTrend::Unknown,
        }
    }
}

/// Hour-of-day activity distribution over the trailing 30 days
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPatterns {
    pub peak_hours: Vec<u32>,
    pub most_productive_hour: u32,
    pub pattern_confidence: f64,
}

impl Default for WorkPatterns {
    fn default() -> Self {
        Self {
            peak_hours: vec![9, 10, 14],
            most_productive_hour: 9,
            pattern_confidence: 0.0,
        }
    }
}

/// Time-of-day energy estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    High,
    Medium,
    Low,
}

impl EnergyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyLevel::High => "high",
            EnergyLevel::Medium => "medium",
            EnergyLevel::Low => "low",
        }
    }

    /// Bucket an hour of day: high 9-11, medium 13-15 and 16-17, else low
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            9..=11 => EnergyLevel::High,
            13..=15 | 16..=17 => EnergyLevel::Medium,
            _ => EnergyLevel::Low,
        }
    }
}

/// Current-time context used for energy and time-fit decisions.
///
/// Local time is a fixed offset from UTC (no DST handling); the offset comes
/// from configuration and defaults to -8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeContext {
    pub current_utc: String,
    pub local_time: String,
    pub hour_of_day: u32,
    pub is_work_hours: bool,
    pub work_day_remaining: f64,
    pub energy_level: EnergyLevel,
    pub day_of_week: String,
    pub is_weekend: bool,
}

/// A previously stored recommendation with any recorded feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentRecommendation {
    pub id: String,
    pub created_at: Option<String>,
    pub recommendations: Value,
    pub action_taken: Option<String>,
    pub outcome: Option<String>,
    pub feedback_score: Option<i64>,
}

/// Point-in-time aggregation of every signal the priority engine consumes.
///
/// Assembled fresh per recommendation request; never persisted as a whole.
/// Each layer degrades independently to its default when its query fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub metrics: MetricsData,
    pub recent_events: Vec<Event>,
    pub active_issues: Vec<EnrichedIssue>,
    pub blocked_items: Vec<BlockedItem>,
    pub pr_status: Vec<PrStatus>,
    pub journey: JourneyState,
    pub momentum: MomentumData,
    pub patterns: WorkPatterns,
    pub time_context: TimeContext,
    pub recent_recommendations: Vec<RecentRecommendation>,
}

impl ContextSnapshot {
    /// Layer names reported in recommendation debug info
    pub fn layer_names() -> Vec<String> {
        [
            "metrics",
            "recent_events",
            "active_issues",
            "blocked_items",
            "pr_status",
            "journey",
            "momentum",
            "patterns",
            "time_context",
            "recent_recommendations",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

/// Candidate action classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Unblock,
    PrReview,
    IssueWork,
    JourneyGoal,
    Maintenance,
    Planning,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Unblock => "unblock",
            ActionType::PrReview => "pr_review",
            ActionType::IssueWork => "issue_work",
            ActionType::JourneyGoal => "journey_goal",
            ActionType::Maintenance => "maintenance",
            ActionType::Planning => "planning",
        }
    }
}

/// A possible next action produced by rule-based enumeration.
///
/// Transient: candidates are regenerated on every request and only the
/// top-ranked result survives into storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAction {
    pub action: String,
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub source: String,
    pub ref_id: Option<String>,
    pub url: Option<String>,
    pub reasoning: String,
    pub urgency: f64,
    pub importance: f64,
    pub time_estimate: String,
}

/// A candidate action with its computed scoring factors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAction {
    #[serde(flatten)]
    pub candidate: CandidateAction,
    pub score: f64,
    pub alignment: f64,
    pub energy_fit: f64,
    pub time_fit: f64,
    pub confidence: f64,
    pub impact_score: f64,
}

/// The top-ranked action in a recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryAction {
    pub action: String,
    pub why: String,
    pub expected_impact: f64,
    pub time_estimate: String,
    pub confidence: f64,
    pub urgency: f64,
    pub importance: f64,
}

/// A runner-up action with its consideration trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub action: String,
    pub why: String,
    pub when_to_consider: String,
    pub time_estimate: String,
}

/// Diagnostic metadata attached to every recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub total_actions_considered: usize,
    pub context_layers: Vec<String>,
    pub ai_reasoning_used: bool,
}

/// Complete priority recommendation returned to the caller and persisted
/// for offline learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityRecommendation {
    pub generated_at: String,
    pub context_id: String,
    pub primary_action: PrimaryAction,
    pub alternatives: Vec<Alternative>,
    pub context_summary: String,
    pub journey_alignment: String,
    pub momentum_insight: String,
    pub energy_match: String,
    pub debug_info: DebugInfo,
}

/// User feedback attached to a stored recommendation after the fact.
///
/// This is the only mutation path on a stored recommendation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationFeedback {
    pub action_taken: Option<String>,
    pub outcome: Option<String>,
    pub feedback_score: Option<i64>,
    pub time_to_complete_minutes: Option<i64>,
}
