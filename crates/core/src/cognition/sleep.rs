use crate::config::DecisionCfg;
use crate::types::{DecisionResult, SleepResult};

/// Pick the wait before the next cycle.
///
/// After a response the loop checks back after `min_sleep_time`. Otherwise the
/// wait stretches with how far the weighted score fell short of the
/// threshold, always within `[min_sleep_time, max_sleep_time]`.
pub fn compute_sleep(decision: &DecisionResult, cfg: &DecisionCfg) -> SleepResult {
    let (min, max) = (cfg.min_sleep_time, cfg.max_sleep_time.max(cfg.min_sleep_time));

    if decision.should_respond {
        return SleepResult {
            duration_secs: min,
            reasoning: format!(
                "responded, conversation active: checking again in min_sleep_time {min}s ({})",
                cfg.wake_up_pattern
            ),
        };
    }

    let factor = inactivity_factor(decision.components.weighted_score, cfg.engagement_threshold);
    let raw = min as f64 * (1.0 + factor as f64);
    let duration_secs = (raw.round() as u64).clamp(min, max);

    SleepResult {
        duration_secs,
        reasoning: format!(
            "waiting: inactivity factor {factor:.2} stretches {min}s to {raw:.0}s, bounded to [{min}s, {max}s] ({})",
            cfg.wake_up_pattern
        ),
    }
}

/// `(threshold - score) / threshold` when the score fell short, else 0.
fn inactivity_factor(score: f32, threshold: f32) -> f32 {
    if threshold > 0.0 && score < threshold {
        ((threshold - score) / threshold).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecisionTrigger, ScoreComponents};

    fn decision(should_respond: bool, score: f32) -> DecisionResult {
        DecisionResult {
            should_respond,
            reasoning: String::new(),
            trigger: if should_respond { DecisionTrigger::ThresholdMet } else { DecisionTrigger::BelowThreshold },
            components: ScoreComponents { weighted_score: score, ..Default::default() },
        }
    }

    #[test]
    fn responding_sleeps_exactly_min() {
        let sleep = compute_sleep(&decision(true, 0.9), &DecisionCfg::default());
        assert_eq!(sleep.duration_secs, 30);
        assert!(sleep.reasoning.contains("min_sleep_time"));
    }

    #[test]
    fn low_score_sleeps_longer_within_bounds() {
        let cfg = DecisionCfg::default();
        let sleep = compute_sleep(&decision(false, 0.1), &cfg);
        assert!(sleep.duration_secs > cfg.min_sleep_time);
        assert!(sleep.duration_secs <= cfg.max_sleep_time);
        assert_eq!(sleep.duration_secs, 54);
        assert!(sleep.reasoning.contains("0.80"));
    }

    #[test]
    fn score_at_or_above_threshold_has_no_factor() {
        let sleep = compute_sleep(&decision(false, 0.7), &DecisionCfg::default());
        assert_eq!(sleep.duration_secs, 30);
        assert_eq!(inactivity_factor(0.5, 0.5), 0.0);
        assert_eq!(inactivity_factor(0.1, 0.0), 0.0);
    }

    #[test]
    fn result_is_clamped_to_max() {
        let cfg = DecisionCfg { min_sleep_time: 400, max_sleep_time: 500, ..DecisionCfg::default() };
        let sleep = compute_sleep(&decision(false, 0.0), &cfg);
        assert_eq!(sleep.duration_secs, 500);
    }

    #[test]
    fn always_within_bounds() {
        let bounds = [(0, 0), (0, 10), (1, 1), (30, 600), (59, 60), (300, 301)];
        let scores = [-1.0, 0.0, 0.1, 0.49, 0.5, 0.9, 1.0, 2.0, f32::NAN];
        for (min, max) in bounds {
            for threshold in [0.0, 0.25, 0.5, 1.0] {
                let cfg = DecisionCfg {
                    min_sleep_time: min,
                    max_sleep_time: max,
                    engagement_threshold: threshold,
                    ..DecisionCfg::default()
                };
                for score in scores {
                    for respond in [true, false] {
                        let s = compute_sleep(&decision(respond, score), &cfg).duration_secs;
                        assert!((min..=max).contains(&s), "min {min} max {max} score {score} -> {s}");
                    }
                }
            }
        }
    }
}
