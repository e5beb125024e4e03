//! Multi-factor action scoring
//!
//! Pure functions: given identical context and candidates, scores, ranking,
//! confidence, and impact are identical on every invocation. Ties keep the
//! enumeration order (stable sort, no secondary key).

use crate::types::{
    ActionType, CandidateAction, ContextSnapshot, EnergyLevel, MomentumTrend, ScoredAction,
};

/// Score and rank candidates, best first.
pub fn score_actions(
    actions: Vec<CandidateAction>,
    context: &ContextSnapshot,
) -> Vec<ScoredAction> {
    let desired_role = context.journey.desired_state.role.to_lowercase();
    let role_targets_seniority =
        desired_role.contains("staff") || desired_role.contains("senior");
    let momentum_multiplier = if context.momentum.trend == MomentumTrend::Increasing {
        1.2
    } else {
        1.0
    };
    let energy_level = context.time_context.energy_level;
    let hours_remaining = context.time_context.work_day_remaining;

    let mut scored: Vec<ScoredAction> = actions
        .into_iter()
        .map(|candidate| {
            let urgency = candidate.urgency;
            let importance = candidate.importance;

            let alignment = if role_targets_seniority {
                match candidate.kind {
                    ActionType::JourneyGoal | ActionType::IssueWork => 0.8,
                    ActionType::PrReview | ActionType::Unblock => 0.7,
                    _ => 0.5,
                }
            } else {
                0.6
            };

            let energy_fit = energy_fit(candidate.kind, energy_level);
            let time_fit = time_fit(&candidate.time_estimate, hours_remaining);

            let score = (urgency * 0.25
                + importance * 0.25
                + alignment * 0.20
                + energy_fit * 0.15
                + time_fit * 0.15)
                * momentum_multiplier;

            ScoredAction {
                score,
                alignment,
                energy_fit,
                time_fit,
                confidence: ((urgency + importance + alignment) / 3.0).min(0.95),
                impact_score: importance * alignment,
                candidate,
            }
        })
        .collect();

    // Stable sort: equal scores keep enumeration order
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

/// How well an action type fits the current energy level.
pub fn energy_fit(kind: ActionType, energy: EnergyLevel) -> f64 {
    use ActionType::*;
    use EnergyLevel::*;

    match (kind, energy) {
        (JourneyGoal, High) => 0.9,
        (JourneyGoal, Medium) => 0.7,
        (JourneyGoal, Low) => 0.3,
        (IssueWork, High) => 0.8,
        (IssueWork, Medium) => 0.8,
        (IssueWork, Low) => 0.4,
        (Unblock, High) => 0.7,
        (Unblock, Medium) => 0.8,
        (Unblock, Low) => 0.6,
        (PrReview, High) => 0.6,
        (PrReview, Medium) => 0.8,
        (PrReview, Low) => 0.7,
        (Maintenance, High) => 0.4,
        (Maintenance, Medium) => 0.6,
        (Maintenance, Low) => 0.9,
        (Planning, High) => 0.7,
        (Planning, Medium) => 0.8,
        (Planning, Low) => 0.5,
    }
}

/// How well an action's time estimate fits the remaining work day.
///
/// The estimate buckets are the fixed strings produced by enumeration;
/// parsing maps each to an implied max-hours.
pub fn time_fit(time_estimate: &str, hours_remaining: f64) -> f64 {
    let max_hours = if time_estimate.contains("15-") || time_estimate.contains("30-") {
        1.0
    } else if time_estimate.contains("1-2") || time_estimate.contains("1-3") {
        2.5
    } else if time_estimate.contains("2-4") {
        4.0
    } else {
        2.0
    };

    if max_hours <= hours_remaining {
        1.0
    } else if max_hours <= hours_remaining + 1.0 {
        0.7
    } else {
        0.3
    }
}
