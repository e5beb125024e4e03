//! Priority recommendation engine
//!
//! Stateless per request: builds a context snapshot, enumerates and scores
//! candidate actions, blends in LLM prose reasoning when a backend is
//! configured (falling back deterministically on rate-limit, timeout, or any
//! backend error), and assembles the final recommendation. The engine never
//! surfaces an error to its caller; the worst case is a generic fixed
//! recommendation.

pub mod actions;
pub mod scoring;

#[cfg(test)]
pub(crate) mod testutil;

use crate::context::ContextBuilder;
use crate::error::PulseError;
use crate::services::ReasoningBackend;
use crate::types::{
    Alternative, ContextSnapshot, DebugInfo, MomentumTrend, PrimaryAction,
    PriorityRecommendation, ScoredAction,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub use actions::identify_possible_actions;
pub use scoring::score_actions;

const REASONING_MAX_TOKENS: u32 = 800;
const REASONING_TEMPERATURE: f32 = 0.3;
const REASONING_TIMEOUT: Duration = Duration::from_secs(30);

const REASONING_SYSTEM_PROMPT: &str = "You are an AI assistant helping prioritize \
engineering tasks. Provide clear, concise reasoning for task recommendations based \
on context. Be specific and actionable.";

/// The three prose sections of a recommendation's reasoning
#[derive(Debug, Clone)]
struct ReasoningSections {
    situation_analysis: String,
    primary_reasoning: String,
    goal_alignment: String,
}

/// Generates priority recommendations from context.
pub struct PriorityEngine {
    context_builder: ContextBuilder,
    reasoning: Option<Arc<dyn ReasoningBackend>>,
}

impl PriorityEngine {
    pub fn new(
        context_builder: ContextBuilder,
        reasoning: Option<Arc<dyn ReasoningBackend>>,
    ) -> Self {
        if reasoning.is_none() {
            warn!("Reasoning backend not configured, using fallback reasoning");
        }
        Self {
            context_builder,
            reasoning,
        }
    }

    /// Generate a recommendation. Infallible by design: any failure in the
    /// pipeline degrades to the fixed fallback recommendation.
    pub async fn generate_recommendation(
        &self,
        journey_id: Option<&str>,
    ) -> PriorityRecommendation {
        let context = self.context_builder.build_context(journey_id).await;

        let candidates = identify_possible_actions(&context);
        let total_considered = candidates.len();
        let scored = score_actions(candidates, &context);

        let Some(primary) = scored.first() else {
            // Unreachable: enumeration always emits at least a planning
            // action, but the caller still deserves a response.
            error!("No candidate actions after scoring");
            return fallback_recommendation();
        };

        let reasoning = self.generate_reasoning(&scored, &context).await;

        let recommendation = PriorityRecommendation {
            generated_at: Utc::now().to_rfc3339(),
            context_id: generate_context_id(&context),
            primary_action: PrimaryAction {
                action: primary.candidate.action.clone(),
                why: reasoning.primary_reasoning.clone(),
                expected_impact: primary.impact_score,
                time_estimate: primary.candidate.time_estimate.clone(),
                confidence: primary.confidence,
                urgency: primary.candidate.urgency,
                importance: primary.candidate.importance,
            },
            alternatives: scored
                .iter()
                .skip(1)
                .take(2)
                .map(|alt| Alternative {
                    action: alt.candidate.action.clone(),
                    why: alt.candidate.reasoning.clone(),
                    when_to_consider: "If primary action is blocked".to_string(),
                    time_estimate: alt.candidate.time_estimate.clone(),
                })
                .collect(),
            context_summary: reasoning.situation_analysis,
            journey_alignment: reasoning.goal_alignment,
            momentum_insight: momentum_insight(&context),
            energy_match: energy_match(primary, &context),
            debug_info: DebugInfo {
                total_actions_considered: total_considered,
                context_layers: ContextSnapshot::layer_names(),
                ai_reasoning_used: self.reasoning.is_some(),
            },
        };

        info!(
            "Generated recommendation: {:.50}...",
            recommendation.primary_action.action
        );
        recommendation
    }

    /// Generate prose reasoning, falling back deterministically on any
    /// backend failure.
    async fn generate_reasoning(
        &self,
        scored: &[ScoredAction],
        context: &ContextSnapshot,
    ) -> ReasoningSections {
        let Some(backend) = &self.reasoning else {
            return fallback_reasoning(scored, context);
        };
        let Some(primary) = scored.first() else {
            return fallback_reasoning(scored, context);
        };

        let prompt = build_reasoning_prompt(primary, context);

        match backend
            .complete(
                REASONING_SYSTEM_PROMPT,
                &prompt,
                REASONING_MAX_TOKENS,
                REASONING_TEMPERATURE,
                REASONING_TIMEOUT,
            )
            .await
        {
            Ok(text) => parse_reasoning(&text, primary),
            Err(PulseError::LlmRateLimited(msg)) => {
                warn!("Reasoning backend rate limited: {}", msg);
                fallback_reasoning(scored, context)
            }
            Err(PulseError::LlmTimeout(secs)) => {
                warn!("Reasoning backend timed out after {}s", secs);
                fallback_reasoning(scored, context)
            }
            Err(e) => {
                error!("Reasoning backend error: {}", e);
                fallback_reasoning(scored, context)
            }
        }
    }
}

/// Build the structured reasoning prompt from the primary action and context.
fn build_reasoning_prompt(primary: &ScoredAction, context: &ContextSnapshot) -> String {
    let journey = &context.journey;
    let time_context = &context.time_context;
    let momentum = &context.momentum;
    let metrics = &context.metrics;

    format!(
        "I need to prioritize my next action. Here's the context:\n\
         \n\
         RECOMMENDED ACTION: {action}\n\
         Action Type: {kind}\n\
         Urgency: {urgency:.2}\n\
         Importance: {importance:.2}\n\
         Score: {score:.2}\n\
         \n\
         JOURNEY CONTEXT:\n\
         Goal: {role}\n\
         Current Status: {status}\n\
         Timeline: {timeline}\n\
         \n\
         TIME CONTEXT:\n\
         Current Time: {local_time}\n\
         Energy Level: {energy}\n\
         Work Hours Remaining: {remaining}\n\
         Is Weekend: {weekend}\n\
         \n\
         MOMENTUM:\n\
         Trend: {trend:?}\n\
         Recent Activity: {recent} events\n\
         Velocity Change: {velocity:.1}x\n\
         \n\
         CURRENT METRICS:\n\
         PRs opened (48h): {prs_open}\n\
         PRs merged (48h): {prs_merged}\n\
         Tickets moved (48h): {tickets_moved}\n\
         Blocked tickets: {tickets_blocked}\n\
         \n\
         Please provide reasoning in this format:\n\
         SITUATION_ANALYSIS: [Brief analysis of current situation]\n\
         PRIMARY_REASONING: [Why this specific action is the best choice right now]\n\
         GOAL_ALIGNMENT: [How this action advances the journey goals]\n",
        action = primary.candidate.action,
        kind = primary.candidate.kind.as_str(),
        urgency = primary.candidate.urgency,
        importance = primary.candidate.importance,
        score = primary.score,
        role = journey.desired_state.role,
        status = journey.current_state.status,
        timeline = journey.desired_state.timeline,
        local_time = time_context.local_time,
        energy = time_context.energy_level.as_str(),
        remaining = time_context.work_day_remaining,
        weekend = time_context.is_weekend,
        trend = momentum.trend,
        recent = momentum.recent_activity,
        velocity = momentum.velocity_change,
        prs_open = metrics.prs_open_48h,
        prs_merged = metrics.prs_merged_48h,
        tickets_moved = metrics.tickets_moved_48h,
        tickets_blocked = metrics.tickets_blocked_now,
    )
}

/// Parse a labeled reasoning response into its three sections. Continuation
/// lines attach to the most recent label; missing sections get defaults.
fn parse_reasoning(text: &str, primary: &ScoredAction) -> ReasoningSections {
    #[derive(PartialEq, Clone, Copy)]
    enum Section {
        Situation,
        Primary,
        Goal,
    }

    let mut situation = String::new();
    let mut primary_reasoning = String::new();
    let mut goal = String::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("SITUATION_ANALYSIS:") {
            current = Some(Section::Situation);
            situation = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("PRIMARY_REASONING:") {
            current = Some(Section::Primary);
            primary_reasoning = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("GOAL_ALIGNMENT:") {
            current = Some(Section::Goal);
            goal = rest.trim().to_string();
        } else if !line.is_empty() {
            match current {
                Some(Section::Situation) => {
                    situation.push(' ');
                    situation.push_str(line);
                }
                Some(Section::Primary) => {
                    primary_reasoning.push(' ');
                    primary_reasoning.push_str(line);
                }
                Some(Section::Goal) => {
                    goal.push(' ');
                    goal.push_str(line);
                }
                None => {}
            }
        }
    }

    ReasoningSections {
        situation_analysis: if situation.is_empty() {
            "Current context analyzed".to_string()
        } else {
            situation
        },
        primary_reasoning: if primary_reasoning.is_empty() {
            primary.candidate.reasoning.clone()
        } else {
            primary_reasoning
        },
        goal_alignment: if goal.is_empty() {
            "Supports overall objectives".to_string()
        } else {
            goal
        },
    }
}

/// Deterministic reasoning used when no backend is configured or the call
/// fails.
fn fallback_reasoning(scored: &[ScoredAction], context: &ContextSnapshot) -> ReasoningSections {
    let Some(primary) = scored.first() else {
        return ReasoningSections {
            situation_analysis: "No specific actions identified from current context"
                .to_string(),
            primary_reasoning: "Time for strategic planning and review".to_string(),
            goal_alignment: "Planning supports all objectives".to_string(),
        };
    };

    let time_context = &context.time_context;
    ReasoningSections {
        situation_analysis: format!(
            "Based on {} possible actions. Current energy: {}. {:.0} hours remaining.",
            scored.len(),
            time_context.energy_level.as_str(),
            time_context.work_day_remaining
        ),
        primary_reasoning: format!(
            "{} Score: {:.2}",
            primary.candidate.reasoning, primary.score
        ),
        goal_alignment: format!(
            "This {} supports your journey toward {}.",
            primary.candidate.kind.as_str(),
            context.journey.desired_state.role
        ),
    }
}

/// One-sentence summary of the momentum trend.
fn momentum_insight(context: &ContextSnapshot) -> String {
    let momentum = &context.momentum;
    match momentum.trend {
        MomentumTrend::Increasing => format!(
            "Momentum is strong (\u{2191}{:.1}x). Great time to tackle challenging work.",
            momentum.velocity_change
        ),
        MomentumTrend::Decreasing => format!(
            "Activity has slowed (\u{2193}{:.1}x). Consider quick wins to rebuild momentum.",
            momentum.velocity_change
        ),
        _ => "Activity is steady. Good time for consistent progress on priorities.".to_string(),
    }
}

/// One-sentence assessment of how the action fits the current energy level.
fn energy_match(primary: &ScoredAction, context: &ContextSnapshot) -> String {
    let level = context.time_context.energy_level.as_str();
    if primary.energy_fit >= 0.8 {
        format!("Perfect match for {} energy level", level)
    } else if primary.energy_fit >= 0.6 {
        format!("Good fit for current {} energy", level)
    } else {
        format!("May be challenging given {} energy level", level)
    }
}

/// Derive the 12-hex-char context id from a canonical subset of the context:
/// current time, journey id, metrics, active-issue count, blocked count.
/// serde_json's map keeps keys sorted, so the serialization is canonical.
fn generate_context_id(context: &ContextSnapshot) -> String {
    let canonical = serde_json::json!({
        "time": context.time_context.current_utc,
        "journey_id": context.journey.id,
        "metrics": context.metrics,
        "active_issues_count": context.active_issues.len(),
        "blocked_count": context.blocked_items.len(),
    });

    let serialized = canonical.to_string();
    let digest = Sha256::digest(serialized.as_bytes());
    let hex = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    hex[..12].to_string()
}

/// Fixed recommendation emitted when the whole pipeline fails.
fn fallback_recommendation() -> PriorityRecommendation {
    PriorityRecommendation {
        generated_at: Utc::now().to_rfc3339(),
        context_id: "fallback".to_string(),
        primary_action: PrimaryAction {
            action: "Review project status and plan next steps".to_string(),
            why: "System unable to analyze current context. Time for manual review."
                .to_string(),
            expected_impact: 0.6,
            time_estimate: "30-60 minutes".to_string(),
            confidence: 0.5,
            urgency: 0.5,
            importance: 0.6,
        },
        alternatives: vec![Alternative {
            action: "Check for urgent notifications or messages".to_string(),
            why: "Ensure nothing critical is waiting".to_string(),
            when_to_consider: "If planning feels premature".to_string(),
            time_estimate: "10-15 minutes".to_string(),
        }],
        context_summary: "Unable to analyze current context. Recommending strategic review."
            .to_string(),
        journey_alignment: "Planning supports all objectives.".to_string(),
        momentum_insight: "Context analysis unavailable.".to_string(),
        energy_match: "Default recommendation suitable for any energy level".to_string(),
        debug_info: DebugInfo {
            total_actions_considered: 1,
            context_layers: Vec::new(),
            ai_reasoning_used: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBuilder;
    use crate::services::llm::MockReasoningBackend;
    use crate::storage::MockStorage;
    use crate::types::{BlockedItem, EnergyLevel, MomentumData};

    fn quiet_storage() -> MockStorage {
        let mut storage = MockStorage::new();
        storage.expect_events_since().returning(|_| Ok(Vec::new()));
        storage.expect_recent_events().returning(|_| Ok(Vec::new()));
        storage
            .expect_latest_issue_events()
            .returning(|_| Ok(Vec::new()));
        storage
            .expect_blocked_issue_events()
            .returning(|_| Ok(Vec::new()));
        storage.expect_open_pr_events().returning(|_| Ok(Vec::new()));
        storage
            .expect_count_events_between()
            .returning(|_, _| Ok(0));
        storage
            .expect_event_counts_by_hour()
            .returning(|_| Ok(Vec::new()));
        storage.expect_active_journey().returning(|| Ok(None));
        storage.expect_journey_by_id().returning(|_| Ok(None));
        storage
            .expect_recent_recommendations()
            .returning(|_| Ok(Vec::new()));
        storage
    }

    fn engine_with(reasoning: Option<Arc<dyn ReasoningBackend>>) -> PriorityEngine {
        let builder = ContextBuilder::new(Arc::new(quiet_storage()), -8);
        PriorityEngine::new(builder, reasoning)
    }

    fn scored_fixture() -> Vec<ScoredAction> {
        let context = testutil::empty_context();
        score_actions(identify_possible_actions(&context), &context)
    }

    #[tokio::test]
    async fn test_generate_without_reasoning_backend() {
        let engine = engine_with(None);
        let rec = engine.generate_recommendation(None).await;

        assert!(!rec.primary_action.action.is_empty());
        assert_eq!(rec.context_id.len(), 12);
        assert!(!rec.debug_info.ai_reasoning_used);
        assert_eq!(rec.debug_info.context_layers.len(), 10);
        assert!(rec.alternatives.len() <= 2);
        assert!(!rec.momentum_insight.is_empty());
        assert!(!rec.energy_match.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_backend_still_yields_recommendation() {
        let mut backend = MockReasoningBackend::new();
        backend
            .expect_complete()
            .returning(|_, _, _, _, _| Err(PulseError::LlmRateLimited("slow down".to_string())));

        let engine = engine_with(Some(Arc::new(backend)));
        let rec = engine.generate_recommendation(None).await;

        assert!(!rec.primary_action.action.is_empty());
        assert!(!rec.context_summary.is_empty());
        assert!(!rec.journey_alignment.is_empty());
        // The backend was configured even though the call fell back
        assert!(rec.debug_info.ai_reasoning_used);
    }

    #[tokio::test]
    async fn test_backend_response_is_parsed_into_sections() {
        let mut backend = MockReasoningBackend::new();
        backend.expect_complete().returning(|_, _, _, _, _| {
            Ok("SITUATION_ANALYSIS: Quiet couple of days.\n\
                Mostly maintenance traffic.\n\
                PRIMARY_REASONING: Planning keeps the backlog honest.\n\
                GOAL_ALIGNMENT: Strategic review supports the staff-role goal.\n"
                .to_string())
        });

        let engine = engine_with(Some(Arc::new(backend)));
        let rec = engine.generate_recommendation(None).await;

        assert_eq!(
            rec.context_summary,
            "Quiet couple of days. Mostly maintenance traffic."
        );
        assert_eq!(
            rec.primary_action.why,
            "Planning keeps the backlog honest."
        );
        assert_eq!(
            rec.journey_alignment,
            "Strategic review supports the staff-role goal."
        );
    }

    #[tokio::test]
    async fn test_timeout_and_generic_errors_fall_back() {
        for err in [
            PulseError::LlmTimeout(30),
            PulseError::LlmApi("boom".to_string()),
        ] {
            let msg = err.to_string();
            let mut backend = MockReasoningBackend::new();
            backend
                .expect_complete()
                .returning(move |_, _, _, _, _| Err(PulseError::Other(msg.clone())));

            let engine = engine_with(Some(Arc::new(backend)));
            let rec = engine.generate_recommendation(None).await;
            assert!(rec.context_summary.contains("possible actions"));
        }
    }

    #[test]
    fn test_parse_reasoning_defaults_on_garbage() {
        let scored = scored_fixture();
        let sections = parse_reasoning("no labels here at all", &scored[0]);
        assert_eq!(sections.situation_analysis, "Current context analyzed");
        assert_eq!(sections.primary_reasoning, scored[0].candidate.reasoning);
        assert_eq!(sections.goal_alignment, "Supports overall objectives");
    }

    #[test]
    fn test_fallback_reasoning_mentions_counts_and_score() {
        let context = testutil::empty_context();
        let scored = scored_fixture();
        let sections = fallback_reasoning(&scored, &context);

        assert!(sections
            .situation_analysis
            .starts_with("Based on 1 possible actions."));
        assert!(sections.primary_reasoning.contains("Score: "));
        assert!(sections.goal_alignment.contains("Staff Engineer"));
    }

    #[test]
    fn test_momentum_insight_templates() {
        let mut context = testutil::empty_context();

        context.momentum = MomentumData::classify(20, 10);
        assert!(momentum_insight(&context).contains("Momentum is strong"));
        assert!(momentum_insight(&context).contains("2.0x"));

        context.momentum = MomentumData::classify(5, 10);
        assert!(momentum_insight(&context).contains("Activity has slowed"));

        context.momentum = MomentumData::classify(10, 10);
        assert!(momentum_insight(&context).contains("steady"));

        context.momentum = MomentumData::unknown();
        assert!(momentum_insight(&context).contains("steady"));
    }

    #[test]
    fn test_energy_match_buckets() {
        let context = testutil::empty_context();
        let mut scored = scored_fixture();

        scored[0].energy_fit = 0.85;
        assert!(energy_match(&scored[0], &context).starts_with("Perfect match"));
        scored[0].energy_fit = 0.7;
        assert!(energy_match(&scored[0], &context).starts_with("Good fit"));
        scored[0].energy_fit = 0.4;
        assert!(energy_match(&scored[0], &context).starts_with("May be challenging"));
    }

    #[test]
    fn test_context_id_is_stable_and_sensitive() {
        let context = testutil::empty_context();
        let id1 = generate_context_id(&context);
        let id2 = generate_context_id(&context);
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 12);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));

        let mut changed = testutil::empty_context();
        changed.blocked_items.push(BlockedItem {
            ref_id: "b1".to_string(),
            title: None,
            url: None,
            blocked_since: None,
            reason: "No reason specified".to_string(),
        });
        assert_ne!(id1, generate_context_id(&changed));
    }

    #[test]
    fn test_fallback_recommendation_payload() {
        let rec = fallback_recommendation();
        assert_eq!(rec.context_id, "fallback");
        assert_eq!(rec.primary_action.confidence, 0.5);
        assert_eq!(rec.alternatives.len(), 1);
        assert_eq!(rec.debug_info.total_actions_considered, 1);
        assert!(!rec.debug_info.ai_reasoning_used);
    }

    #[tokio::test]
    async fn test_low_energy_context_prefers_low_energy_action() {
        // Planning fallback at low energy still beats nothing: just assert
        // the engine returns the planning action for an empty context
        let engine = engine_with(None);
        let rec = engine.generate_recommendation(None).await;
        assert!(rec
            .primary_action
            .action
            .contains("Review project status"));
    }

    #[test]
    fn test_reasoning_prompt_contains_labels() {
        let context = testutil::empty_context();
        let scored = scored_fixture();
        let prompt = build_reasoning_prompt(&scored[0], &context);

        assert!(prompt.contains("RECOMMENDED ACTION:"));
        assert!(prompt.contains("JOURNEY CONTEXT:"));
        assert!(prompt.contains("SITUATION_ANALYSIS:"));
        assert!(prompt.contains("PRIMARY_REASONING:"));
        assert!(prompt.contains("GOAL_ALIGNMENT:"));
        assert!(prompt.contains("Staff Engineer"));
    }
}
