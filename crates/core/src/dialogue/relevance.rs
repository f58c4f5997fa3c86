//! Context relevance: how well the pending messages fit the ongoing topic.

use std::collections::HashSet;

use crate::types::ConversationMessage;

/// Pluggable relevance measure.
///
/// Returns a value in [0, 1], or `None` when there is nothing to compare
/// against; the decision scorer then uses a neutral 0.5.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, pending: &[&ConversationMessage], history: &[&ConversationMessage]) -> Option<f32>;
}

/// Keyword overlap between pending messages and recent history.
///
/// Score is the share of distinct pending keywords (3+ chars, lowercased)
/// that already occurred in the last `lookback` history entries.
#[derive(Debug, Clone)]
pub struct KeywordOverlapScorer {
    lookback: usize,
}

impl KeywordOverlapScorer {
    pub fn new(lookback: usize) -> Self {
        Self { lookback: lookback.max(1) }
    }
}

impl Default for KeywordOverlapScorer {
    fn default() -> Self {
        Self::new(10)
    }
}

impl RelevanceScorer for KeywordOverlapScorer {
    fn score(&self, pending: &[&ConversationMessage], history: &[&ConversationMessage]) -> Option<f32> {
        let incoming: HashSet<String> = pending.iter().flat_map(|m| keywords(&m.content)).collect();
        let start = history.len().saturating_sub(self.lookback);
        let topic: HashSet<String> = history[start..].iter().flat_map(|m| keywords(&m.content)).collect();
        if incoming.is_empty() || topic.is_empty() {
            return None;
        }
        let shared = incoming.intersection(&topic).count();
        Some(shared as f32 / incoming.len() as f32)
    }
}

fn keywords(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
}
