//! Decision pipeline without the background loop:
//! config → engagement tracker → decision scorer → sleep calculator.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use proactive_core::dialogue::{ConversationState, EngagementTracker, KeywordOverlapScorer};
use proactive_core::types::{ConversationMessage, DecisionTrigger};
use proactive_core::{DecisionCfg, DecisionScorer, compute_sleep};

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn example_cfg() -> DecisionCfg {
    let pairs = [
        ("min_response_interval", "30"),
        ("max_response_interval", "600"),
        ("engagement_threshold", "0.5"),
        ("context_relevance_weight", "0.4"),
        ("time_weight", "0.3"),
        ("probability_weight", "0.3"),
    ];
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    DecisionCfg::from_map(&map).unwrap()
}

fn tracker(cfg: &DecisionCfg) -> EngagementTracker {
    EngagementTracker::new(
        std::time::Duration::from_secs(cfg.max_response_interval),
        cfg.engagement_high_threshold,
        cfg.engagement_medium_threshold,
    )
}

/// Last response at t0, then the given user messages (seconds after t0).
fn conversation(messages: &[(i64, &str)]) -> ConversationState {
    let mut state = ConversationState::new(50, t0() - Duration::seconds(3600));
    state.ingest(ConversationMessage::user_at("hi", t0() - Duration::seconds(60)));
    state.record_response("hello!", t0());
    for (offset, text) in messages {
        state.ingest(ConversationMessage::user_at(*text, t0() + Duration::seconds(*offset)));
    }
    state
}

/// One message, 10s after the last response: too soon.
#[test]
fn one_message_ten_seconds_in_waits() {
    let cfg = example_cfg();
    let state = conversation(&[(5, "what's up?")]);
    let mut engagement = tracker(&cfg);
    engagement.record_message(t0() + Duration::seconds(5));

    let now = t0() + Duration::seconds(10);
    let decision = DecisionScorer::default().decide(&state, &engagement.snapshot(now), &cfg, now);
    assert!(!decision.should_respond);
    assert_eq!(decision.trigger, DecisionTrigger::MinIntervalNotMet);

    let sleep = compute_sleep(&decision, &cfg);
    assert!(sleep.duration_secs >= cfg.min_sleep_time);
    assert!(sleep.duration_secs <= cfg.max_sleep_time);
}

/// 650s of silence with no recent engagement forces a response.
#[test]
fn long_silence_forces_response() {
    let cfg = example_cfg();
    // sent long enough ago to have left the engagement window
    let state = conversation(&[(-1, "are you there?")]);
    let engagement = tracker(&cfg);

    let now = t0() + Duration::seconds(650);
    let snapshot = engagement.snapshot(now);
    assert_eq!(snapshot.score, 0.0);

    let decision = DecisionScorer::default().decide(&state, &snapshot, &cfg, now);
    assert!(decision.should_respond);
    assert_eq!(decision.trigger, DecisionTrigger::ForcedMaxInterval);
    assert!(decision.reasoning.contains("max_response_interval"));

    let sleep = compute_sleep(&decision, &cfg);
    assert_eq!(sleep.duration_secs, 30);
}

/// A burst of on-topic messages crosses the threshold before max interval.
#[test]
fn active_on_topic_burst_responds() {
    let cfg = example_cfg();
    let burst: Vec<(i64, &str)> = (0..8).map(|i| (200 + i, "more about the rust borrow checker")).collect();
    let mut state = ConversationState::new(50, t0() - Duration::seconds(3600));
    state.ingest(ConversationMessage::user_at("tell me about the rust borrow checker", t0() - Duration::seconds(30)));
    state.record_response("the borrow checker enforces ownership rules", t0());
    let mut engagement = tracker(&cfg);
    for (offset, text) in &burst {
        let at = t0() + Duration::seconds(*offset);
        state.ingest(ConversationMessage::user_at(*text, at));
        engagement.record_message(at);
    }

    let now = t0() + Duration::seconds(300);
    let scorer = DecisionScorer::new(Some(Arc::new(KeywordOverlapScorer::default())));
    let decision = scorer.decide(&state, &engagement.snapshot(now), &cfg, now);
    assert!(decision.should_respond, "{}", decision.reasoning);
    assert_eq!(decision.trigger, DecisionTrigger::ThresholdMet);
    assert!(decision.components.context_relevance > 0.5);
}

/// A quiet, off-topic user inside the window is left alone for longer.
#[test]
fn quiet_user_sleeps_longer() {
    let cfg = example_cfg();
    let state = conversation(&[(100, "unrelated printer noise")]);
    let mut engagement = tracker(&cfg);
    engagement.record_message(t0() + Duration::seconds(100));

    let now = t0() + Duration::seconds(120);
    let scorer = DecisionScorer::new(Some(Arc::new(KeywordOverlapScorer::default())));
    let decision = scorer.decide(&state, &engagement.snapshot(now), &cfg, now);
    assert!(!decision.should_respond);
    assert_eq!(decision.trigger, DecisionTrigger::BelowThreshold);

    let sleep = compute_sleep(&decision, &cfg);
    assert!(sleep.duration_secs > cfg.min_sleep_time);
    assert!(sleep.duration_secs <= cfg.max_sleep_time);
}
