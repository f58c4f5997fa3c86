pub mod conversation;
pub mod engagement;
pub mod relevance;

pub use conversation::ConversationState;
pub use engagement::EngagementTracker;
pub use relevance::{KeywordOverlapScorer, RelevanceScorer};
