//! Shared fixtures for engine tests

use crate::types::{
    ContextSnapshot, CurrentState, DesiredState, EnergyLevel, JourneyState, MetricsData,
    MomentumData, TimeContext, WorkPatterns, WorkPreferences,
};

pub(crate) fn test_time_context(energy: EnergyLevel, remaining: f64) -> TimeContext {
    TimeContext {
        current_utc: "2025-06-04T18:00:00+00:00".to_string(),
        local_time: "2025-06-04T10:00:00-08:00".to_string(),
        hour_of_day: 10,
        is_work_hours: true,
        work_day_remaining: remaining,
        energy_level: energy,
        day_of_week: "Wednesday".to_string(),
        is_weekend: false,
    }
}

/// A context with a seniority-targeting journey and no activity at all.
pub(crate) fn empty_context() -> ContextSnapshot {
    ContextSnapshot {
        metrics: MetricsData::default(),
        recent_events: Vec::new(),
        active_issues: Vec::new(),
        blocked_items: Vec::new(),
        pr_status: Vec::new(),
        journey: JourneyState {
            id: "j1".to_string(),
            desired_state: DesiredState {
                role: "Staff Engineer".to_string(),
                timeline: "6 months".to_string(),
                priorities: Vec::new(),
            },
            current_state: CurrentState {
                status: "working".to_string(),
                momentum: "steady".to_string(),
                current_project: None,
            },
            preferences: WorkPreferences::default(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        },
        momentum: MomentumData::classify(10, 10),
        patterns: WorkPatterns::default(),
        time_context: test_time_context(EnergyLevel::High, 7.0),
        recent_recommendations: Vec::new(),
    }
}
