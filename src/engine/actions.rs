//! Candidate action enumeration
//!
//! Deterministic rule-based generation of possible next actions from the
//! context snapshot. The per-source caps (2 blocked / 2 PRs / 3 issues /
//! 2 journey goals) and the fixed urgency/importance values are policy:
//! identical context must always enumerate identical candidates.

use crate::types::{ActionType, CandidateAction, ContextSnapshot, EnergyLevel};

/// Enumerate candidate actions from the context. Always returns at least one
/// candidate (a planning fallback when nothing else applies).
pub fn identify_possible_actions(context: &ContextSnapshot) -> Vec<CandidateAction> {
    let mut actions = Vec::new();

    // Blocked items are the most urgent signal
    for item in context.blocked_items.iter().take(2) {
        actions.push(CandidateAction {
            action: format!(
                "Unblock: {}",
                item.title.as_deref().unwrap_or("Unknown item")
            ),
            kind: ActionType::Unblock,
            source: "linear".to_string(),
            ref_id: Some(item.ref_id.clone()),
            url: item.url.clone(),
            reasoning: format!(
                "Item blocked since {}",
                item.blocked_since.as_deref().unwrap_or("recently")
            ),
            urgency: 0.8,
            importance: 0.6,
            time_estimate: "30-60 minutes".to_string(),
        });
    }

    // Aging PRs grow more urgent as they sit, capped at 0.9
    for pr in context
        .pr_status
        .iter()
        .filter(|pr| pr.needs_review)
        .take(2)
    {
        actions.push(CandidateAction {
            action: format!("Review PR: {}", pr.title.as_deref().unwrap_or("Unknown PR")),
            kind: ActionType::PrReview,
            source: "github".to_string(),
            ref_id: Some(pr.ref_id.clone()),
            url: pr.url.clone(),
            reasoning: format!("PR aging for {:.0} hours", pr.hours_old),
            urgency: (pr.hours_old / 48.0).min(0.9),
            importance: 0.5,
            time_estimate: "15-30 minutes".to_string(),
        });
    }

    // Active issues, weighted by their Linear priority
    for issue in context.active_issues.iter().take(3) {
        let multiplier = issue.priority.multiplier();
        actions.push(CandidateAction {
            action: format!(
                "Advance: {}",
                issue.title.as_deref().unwrap_or("Unknown issue")
            ),
            kind: ActionType::IssueWork,
            source: "linear".to_string(),
            ref_id: Some(issue.ref_id.clone()),
            url: issue.url.clone(),
            reasoning: format!(
                "Issue in {} state for {:.0} days",
                issue.state, issue.days_old
            ),
            urgency: (issue.days_old / 7.0).min(0.8) * multiplier,
            importance: multiplier,
            time_estimate: "1-3 hours".to_string(),
        });
    }

    // Journey goals: strategic, less urgent but very important
    let desired_state = &context.journey.desired_state;
    for (i, priority) in desired_state.priorities.iter().take(2).enumerate() {
        actions.push(CandidateAction {
            action: format!("Advance journey goal: {}", priority),
            kind: ActionType::JourneyGoal,
            source: "journey".to_string(),
            ref_id: Some(format!("journey_priority_{}", i)),
            url: None,
            reasoning: format!("Strategic goal aligned with {}", desired_state.role),
            urgency: 0.4,
            importance: 0.9,
            time_estimate: "2-4 hours".to_string(),
        });
    }

    // Quick wins when energy is low or the day is nearly over
    let time_context = &context.time_context;
    if time_context.energy_level == EnergyLevel::Low || time_context.work_day_remaining < 2.0 {
        actions.push(CandidateAction {
            action: "Review and update documentation".to_string(),
            kind: ActionType::Maintenance,
            source: "system".to_string(),
            ref_id: None,
            url: None,
            reasoning: "Low-energy task for end of day".to_string(),
            urgency: 0.2,
            importance: 0.4,
            time_estimate: "30-60 minutes".to_string(),
        });
        actions.push(CandidateAction {
            action: "Organize and clean up local development environment".to_string(),
            kind: ActionType::Maintenance,
            source: "system".to_string(),
            ref_id: None,
            url: None,
            reasoning: "Maintenance task suitable for low energy".to_string(),
            urgency: 0.1,
            importance: 0.3,
            time_estimate: "15-45 minutes".to_string(),
        });
    }

    if actions.is_empty() {
        actions.push(CandidateAction {
            action: "Review project status and plan next steps".to_string(),
            kind: ActionType::Planning,
            source: "fallback".to_string(),
            ref_id: None,
            url: None,
            reasoning: "No specific actions identified, time for strategic review".to_string(),
            urgency: 0.5,
            importance: 0.6,
            time_estimate: "30-60 minutes".to_string(),
        });
    }

    actions
}
