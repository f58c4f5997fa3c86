use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who produced a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Agent,
}

/// One entry in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::user_at(content, Utc::now())
    }

    pub fn user_at(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(), speaker: Speaker::User, content: content.into(), timestamp }
    }

    pub fn agent_at(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(), speaker: Speaker::Agent, content: content.into(), timestamp }
    }
}

/// Coarse engagement bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Engagement derived for one cycle. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementSnapshot {
    pub recent_count: u32,
    /// Normalized score in [0, 1].
    pub score: f32,
    pub level: ActivityLevel,
}

/// Rule that settled a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTrigger {
    NoNewInput,
    MinIntervalNotMet,
    ForcedMaxInterval,
    ThresholdMet,
    BelowThreshold,
    /// Decided to respond but generation failed.
    ProviderFailed,
}

/// Sub-scores behind a decision, all in [0, 1] except `elapsed_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub context_relevance: f32,
    pub time_pressure: f32,
    pub engagement_probability: f32,
    pub weighted_score: f32,
    pub elapsed_secs: f64,
}

/// Outcome of one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub should_respond: bool,
    pub reasoning: String,
    pub trigger: DecisionTrigger,
    pub components: ScoreComponents,
}

impl DecisionResult {
    /// Downgrade a positive decision after the provider failed.
    pub fn into_failed(self, error: &impl fmt::Display) -> Self {
        Self {
            should_respond: false,
            reasoning: format!("{}; response generation failed: {error}", self.reasoning),
            trigger: DecisionTrigger::ProviderFailed,
            components: self.components,
        }
    }
}

/// How long the loop waits before the next cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepResult {
    pub duration_secs: u64,
    pub reasoning: String,
}

/// Lifecycle of an agent's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgentStatus {
    #[default]
    Stopped,
    Running,
    Stopping,
}

/// Observer event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Response,
    Decision,
    Sleep,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Response => "response",
            Self::Decision => "decision",
            Self::Sleep => "sleep",
        })
    }
}

/// Payload dispatched to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Response(String),
    Decision(DecisionResult),
    Sleep(SleepResult),
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Response(_) => EventKind::Response,
            Self::Decision(_) => EventKind::Decision,
            Self::Sleep(_) => EventKind::Sleep,
        }
    }
}

/// Recovered failures, published for whoever wants to watch them.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    ObserverFailed(crate::error::ObserverError),
    ProviderFailed { cycle: u64, message: String },
    MessageDropped { content: String, status: AgentStatus },
    /// The decision loop ended without being stopped; the agent is Stopped.
    LoopExited { reason: String },
}
