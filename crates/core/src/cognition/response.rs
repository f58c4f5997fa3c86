use async_trait::async_trait;
use proactive_llm::{ChatMessage, CompletionRequest, LlmProvider};
use std::sync::Arc;

use crate::error::ProviderError;
use crate::types::{ConversationMessage, DecisionResult, Speaker};

/// Everything a generator gets to see for one response.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub system_prompt: String,
    /// Retained history in arrival order, pending messages last.
    pub history: Vec<ConversationMessage>,
    /// Number of trailing user messages not yet answered.
    pub pending: usize,
    pub decision: DecisionResult,
}

/// Turns conversation context into response text.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, context: &ResponseContext) -> Result<String, ProviderError>;
}

/// [`ResponseGenerator`] backed by any [`LlmProvider`].
pub struct LlmResponder {
    provider: Arc<dyn LlmProvider>,
    max_tokens: u32,
    temperature: f32,
}

impl LlmResponder {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider, max_tokens: 512, temperature: 0.7 }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ResponseGenerator for LlmResponder {
    async fn generate(&self, context: &ResponseContext) -> Result<String, ProviderError> {
        let request = CompletionRequest {
            messages: build_messages(context),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let response = self.provider.complete(request).await?;
        tracing::debug!(
            provider = self.provider.name(),
            trigger = ?context.decision.trigger,
            pending = context.pending,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "response generated"
        );
        let text = response.content.trim();
        if text.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(text.to_owned())
    }
}

/// Build the message list for an LLM call: system prompt, then history.
pub fn build_messages(context: &ResponseContext) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(context.history.len() + 1);
    messages.push(ChatMessage::system(context.system_prompt.clone()));
    messages.extend(context.history.iter().map(|m| match m.speaker {
        Speaker::User => ChatMessage::user(m.content.clone()),
        Speaker::Agent => ChatMessage::assistant(m.content.clone()),
    }));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecisionTrigger, ScoreComponents};
    use proactive_llm::provider::MockProvider;
    use proactive_llm::{LlmError, Role};

    fn context(history: Vec<ConversationMessage>, pending: usize) -> ResponseContext {
        ResponseContext {
            system_prompt: "You are a helpful AI assistant.".into(),
            history,
            pending,
            decision: DecisionResult {
                should_respond: true,
                reasoning: "threshold met".into(),
                trigger: DecisionTrigger::ThresholdMet,
                components: ScoreComponents::default(),
            },
        }
    }

    #[test]
    fn build_messages_maps_speakers() {
        let now = chrono::Utc::now();
        let ctx = context(
            vec![
                ConversationMessage::user_at("hi", now),
                ConversationMessage::agent_at("hello", now),
                ConversationMessage::user_at("how are you?", now),
            ],
            1,
        );
        let messages = build_messages(&ctx);
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[0].content, "You are a helpful AI assistant.");
        assert_eq!(messages[3].content, "how are you?");
    }

    #[tokio::test]
    async fn responder_returns_trimmed_text() {
        let responder = LlmResponder::new(Arc::new(MockProvider::new("  sure thing \n")));
        let ctx = context(vec![ConversationMessage::user("hi")], 1);
        assert_eq!(responder.generate(&ctx).await.unwrap(), "sure thing");
    }

    #[tokio::test]
    async fn responder_sends_sampling_settings() {
        let provider = Arc::new(MockProvider::new("ok"));
        let responder = LlmResponder::new(provider.clone()).with_max_tokens(64).with_temperature(0.2);
        let ctx = context(vec![ConversationMessage::user("hi")], 1);
        responder.generate(&ctx).await.unwrap();

        let request = provider.last_request().unwrap();
        assert_eq!(request.max_tokens, 64);
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn responder_maps_provider_failures() {
        let responder = LlmResponder::new(Arc::new(MockProvider::failing(LlmError::RateLimited)));
        let ctx = context(vec![ConversationMessage::user("hi")], 1);
        let err = responder.generate(&ctx).await.unwrap_err();
        assert!(matches!(err, ProviderError::Llm(LlmError::RateLimited)));

        let responder = LlmResponder::new(Arc::new(MockProvider::new("   ")));
        assert!(matches!(responder.generate(&ctx).await, Err(ProviderError::Empty)));
    }
}
