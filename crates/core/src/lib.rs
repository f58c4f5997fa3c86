//! Decision and scheduling core of a proactive conversation agent.
//!
//! An [`Agent`] runs one background decision loop per instance. Each cycle
//! scores the conversation (context relevance, time since the last
//! response, user engagement), decides whether to answer, optionally asks a
//! [`ResponseGenerator`] for text, reports everything to registered
//! observers and then waits an adaptive, interruptible interval.

pub mod cognition;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod runtime;
pub mod types;

pub use cognition::{DecisionScorer, LlmResponder, ResponseContext, ResponseGenerator, compute_sleep};
pub use config::{AgentCfg, DecisionCfg};
pub use dialogue::{ConversationState, EngagementTracker, KeywordOverlapScorer, RelevanceScorer};
pub use error::{ConfigError, ObserverError, ProviderError};
pub use runtime::{Agent, CallbackId, CallbackRegistry, Observer};
pub use types::{AgentEvent, AgentStatus, DecisionResult, DecisionTrigger, Diagnostic, EventKind, SleepResult};
