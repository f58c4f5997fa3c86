use chrono::{DateTime, Utc};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::config::DecisionCfg;
use crate::error::panic_message;
use crate::dialogue::{ConversationState, RelevanceScorer};
use crate::types::{DecisionResult, DecisionTrigger, EngagementSnapshot, ScoreComponents};

/// Relevance used when no scorer is configured or it has nothing to compare.
pub const NEUTRAL_RELEVANCE: f32 = 0.5;

/// Weighted respond/wait decision.
///
/// Rules, first match wins:
/// 1. no unanswered user message → wait
/// 2. elapsed < `min_response_interval` → wait
/// 3. elapsed ≥ `max_response_interval` → respond (forced)
/// 4. weighted score ≥ `engagement_threshold` → respond
/// 5. otherwise wait
#[derive(Clone, Default)]
pub struct DecisionScorer {
    relevance: Option<Arc<dyn RelevanceScorer>>,
}

impl DecisionScorer {
    pub fn new(relevance: Option<Arc<dyn RelevanceScorer>>) -> Self {
        Self { relevance }
    }

    pub fn decide(
        &self,
        state: &ConversationState,
        engagement: &EngagementSnapshot,
        cfg: &DecisionCfg,
        now: DateTime<Utc>,
    ) -> DecisionResult {
        let components = self.components(state, engagement, cfg, now);
        let elapsed = components.elapsed_secs;
        let score = components.weighted_score;

        let (should_respond, trigger, reasoning) = if !state.has_new_input() {
            (false, DecisionTrigger::NoNewInput, "no new input".to_owned())
        } else if elapsed < cfg.min_response_interval as f64 {
            (
                false,
                DecisionTrigger::MinIntervalNotMet,
                format!(
                    "minimum response interval not met: {elapsed:.1}s since last response < {}s (score {score:.2})",
                    cfg.min_response_interval
                ),
            )
        } else if elapsed >= cfg.max_response_interval as f64 {
            (
                true,
                DecisionTrigger::ForcedMaxInterval,
                format!(
                    "forced response: {elapsed:.1}s since last response reached max_response_interval {}s (score {score:.2})",
                    cfg.max_response_interval
                ),
            )
        } else if score >= cfg.engagement_threshold {
            (
                true,
                DecisionTrigger::ThresholdMet,
                format!(
                    "threshold met: score {score:.2} >= {:.2} ({})",
                    cfg.engagement_threshold,
                    describe(&components, engagement)
                ),
            )
        } else {
            (
                false,
                DecisionTrigger::BelowThreshold,
                format!(
                    "below threshold: score {score:.2} < {:.2} ({})",
                    cfg.engagement_threshold,
                    describe(&components, engagement)
                ),
            )
        };

        DecisionResult { should_respond, reasoning, trigger, components }
    }

    fn components(
        &self,
        state: &ConversationState,
        engagement: &EngagementSnapshot,
        cfg: &DecisionCfg,
        now: DateTime<Utc>,
    ) -> ScoreComponents {
        let elapsed_secs = state.secs_since_response(now);

        let context_relevance = self
            .relevance
            .as_ref()
            .and_then(|r| score_relevance(r.as_ref(), state))
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 1.0))
            .unwrap_or(NEUTRAL_RELEVANCE);

        let time_pressure = if cfg.max_response_interval == 0 {
            1.0
        } else {
            (elapsed_secs / cfg.max_response_interval as f64).min(1.0) as f32
        };

        let engagement_probability = engagement.score.clamp(0.0, 1.0);

        let weight_sum = cfg.weight_sum();
        // A zero weight sum leaves nothing to normalize by; stay neutral.
        let weighted_score = if weight_sum > 0.0 {
            (cfg.context_relevance_weight * context_relevance
                + cfg.time_weight * time_pressure
                + cfg.probability_weight * engagement_probability)
                / weight_sum
        } else {
            0.5
        };

        ScoreComponents {
            context_relevance,
            time_pressure,
            engagement_probability,
            weighted_score,
            elapsed_secs,
        }
    }
}

/// A panicking scorer counts as unavailable.
fn score_relevance(scorer: &dyn RelevanceScorer, state: &ConversationState) -> Option<f32> {
    let pending = state.pending();
    let earlier = state.earlier();
    match catch_unwind(AssertUnwindSafe(|| scorer.score(&pending, &earlier))) {
        Ok(score) => score,
        Err(payload) => {
            tracing::warn!(error = %panic_message(payload.as_ref()), "relevance scorer panicked, using neutral relevance");
            None
        }
    }
}

fn describe(c: &ScoreComponents, engagement: &EngagementSnapshot) -> String {
    format!(
        "relevance {:.2}, time pressure {:.2}, engagement {:.2} [{}]",
        c.context_relevance, c.time_pressure, c.engagement_probability, engagement.level
    )
}
