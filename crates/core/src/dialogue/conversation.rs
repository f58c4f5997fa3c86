use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::types::{ConversationMessage, Speaker};

/// Conversation history owned by the control loop.
///
/// Scorers and observers only ever see `&ConversationState`.
#[derive(Debug, Clone)]
pub struct ConversationState {
    entries: VecDeque<ConversationMessage>,
    capacity: usize,
    started_at: DateTime<Utc>,
    last_response_at: Option<DateTime<Utc>>,
    last_user_message_at: Option<DateTime<Utc>>,
    /// User messages received since the last response.
    unanswered: usize,
}

impl ConversationState {
    pub fn new(capacity: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            started_at,
            last_response_at: None,
            last_user_message_at: None,
            unanswered: 0,
        }
    }

    /// Append an inbound user message.
    pub fn ingest(&mut self, message: ConversationMessage) {
        debug_assert_eq!(message.speaker, Speaker::User);
        self.last_user_message_at = Some(match self.last_user_message_at {
            Some(prev) => prev.max(message.timestamp),
            None => message.timestamp,
        });
        self.unanswered += 1;
        self.push(message);
    }

    /// Append the agent's response and mark pending input as answered.
    pub fn record_response(&mut self, content: impl Into<String>, at: DateTime<Utc>) {
        self.push(ConversationMessage::agent_at(content, at));
        self.last_response_at = Some(at);
        self.unanswered = 0;
    }

    fn push(&mut self, message: ConversationMessage) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    /// Restart the response clock, for a conversation that has not begun.
    /// No-op once anything was said.
    pub fn begin(&mut self, at: DateTime<Utc>) {
        if self.entries.is_empty() && self.last_response_at.is_none() {
            self.started_at = at;
        }
    }

    /// All retained entries in arrival order.
    pub fn entries(&self) -> &VecDeque<ConversationMessage> {
        &self.entries
    }

    /// User messages not yet answered, oldest first.
    pub fn pending(&self) -> Vec<&ConversationMessage> {
        let mut pending: Vec<_> = self
            .entries
            .iter()
            .rev()
            .filter(|m| m.speaker == Speaker::User)
            .take(self.unanswered)
            .collect();
        pending.reverse();
        pending
    }

    /// Entries before the pending block.
    pub fn earlier(&self) -> Vec<&ConversationMessage> {
        let cut = match self.pending().first() {
            Some(first) => self.entries.iter().position(|m| m.id == first.id).unwrap_or(0),
            None => self.entries.len(),
        };
        self.entries.range(..cut).collect()
    }

    pub fn has_new_input(&self) -> bool {
        self.unanswered > 0
    }

    pub fn unanswered(&self) -> usize {
        self.unanswered
    }

    pub fn last_response_at(&self) -> Option<DateTime<Utc>> {
        self.last_response_at
    }

    pub fn last_user_message_at(&self) -> Option<DateTime<Utc>> {
        self.last_user_message_at
    }

    /// Seconds since the last response, or since the conversation began.
    pub fn secs_since_response(&self, now: DateTime<Utc>) -> f64 {
        let since = self.last_response_at.unwrap_or(self.started_at);
        ((now - since).num_milliseconds() as f64 / 1000.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn ingest_tracks_pending_in_order() {
        let mut state = ConversationState::new(10, t0());
        assert!(!state.has_new_input());
        state.ingest(ConversationMessage::user_at("one", t0()));
        state.ingest(ConversationMessage::user_at("two", t0() + Duration::seconds(1)));
        let pending: Vec<_> = state.pending().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(pending, ["one", "two"]);
        assert_eq!(state.last_user_message_at(), Some(t0() + Duration::seconds(1)));
    }

    #[test]
    fn response_clears_pending_and_resets_clock() {
        let mut state = ConversationState::new(10, t0());
        state.ingest(ConversationMessage::user_at("hi", t0()));
        assert_eq!(state.secs_since_response(t0() + Duration::seconds(40)), 40.0);

        state.record_response("hello", t0() + Duration::seconds(40));
        assert!(!state.has_new_input());
        assert!(state.pending().is_empty());
        assert_eq!(state.secs_since_response(t0() + Duration::seconds(50)), 10.0);

        state.ingest(ConversationMessage::user_at("again", t0() + Duration::seconds(45)));
        assert_eq!(state.pending().len(), 1);
        assert_eq!(state.earlier().len(), 2);
    }

    #[test]
    fn capacity_evicts_oldest_but_keeps_pending_count() {
        let mut state = ConversationState::new(2, t0());
        for text in ["a", "b", "c"] {
            state.ingest(ConversationMessage::user_at(text, t0()));
        }
        assert_eq!(state.entries().len(), 2);
        assert_eq!(state.entries()[0].content, "b");
        assert_eq!(state.unanswered(), 3);
        assert_eq!(state.pending().len(), 2);
        assert!(state.has_new_input());
    }

    #[test]
    fn begin_only_moves_an_untouched_clock() {
        let mut state = ConversationState::new(10, t0());
        state.begin(t0() + Duration::seconds(900));
        assert_eq!(state.secs_since_response(t0() + Duration::seconds(910)), 10.0);

        state.ingest(ConversationMessage::user_at("hi", t0() + Duration::seconds(910)));
        state.begin(t0() + Duration::seconds(2000));
        assert_eq!(state.secs_since_response(t0() + Duration::seconds(2000)), 1100.0);
    }
}
