use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::callbacks::CallbackRegistry;
use crate::cognition::{DecisionScorer, ResponseContext, ResponseGenerator, compute_sleep};
use crate::config::AgentCfg;
use crate::dialogue::{ConversationState, EngagementTracker};
use crate::error::{ProviderError, panic_message};
use crate::types::{AgentEvent, AgentStatus, ConversationMessage, DecisionResult, Diagnostic, SleepResult};

/// Shortest real wait between cycles; a zero-second sleep would spin.
const MIN_WAIT: Duration = Duration::from_secs(1);

/// What ended a wait.
enum Wake {
    Stop,
    Input(ConversationMessage),
    Closed,
    Timer,
}

/// The decision cycle and the state it exclusively owns.
///
/// Runs as one tokio task while the agent is running and is handed back to
/// the agent on stop, so the conversation survives a restart.
pub(crate) struct DecisionLoop {
    cfg: Arc<AgentCfg>,
    conversation: ConversationState,
    engagement: EngagementTracker,
    pub(crate) scorer: DecisionScorer,
    generator: Arc<dyn ResponseGenerator>,
    callbacks: Arc<CallbackRegistry>,
    diagnostics: broadcast::Sender<Diagnostic>,
    status: watch::Sender<AgentStatus>,
    input_rx: mpsc::UnboundedReceiver<ConversationMessage>,
    cycle_count: u64,
    /// Provider failure to mention in the next decision.
    last_failure: Option<String>,
}

impl DecisionLoop {
    pub(crate) fn new(
        cfg: Arc<AgentCfg>,
        scorer: DecisionScorer,
        generator: Arc<dyn ResponseGenerator>,
        callbacks: Arc<CallbackRegistry>,
        diagnostics: broadcast::Sender<Diagnostic>,
        status: watch::Sender<AgentStatus>,
        input_rx: mpsc::UnboundedReceiver<ConversationMessage>,
    ) -> Self {
        let engagement = EngagementTracker::new(
            cfg.engagement_window(),
            cfg.decision.engagement_high_threshold,
            cfg.decision.engagement_medium_threshold,
        );
        Self {
            conversation: ConversationState::new(cfg.max_history, Utc::now()),
            engagement,
            scorer,
            generator,
            callbacks,
            diagnostics,
            status,
            input_rx,
            cycle_count: 0,
            last_failure: None,
            cfg,
        }
    }

    /// Cycle until `token` is cancelled. An in-flight cycle always finishes.
    pub(crate) async fn run(mut self, token: CancellationToken) -> Self {
        tracing::info!(cycle_count = self.cycle_count, "decision loop started");
        if self.cycle_count == 0 {
            self.conversation.begin(Utc::now());
        }
        let mut exit = ExitWatch {
            token: token.clone(),
            status: self.status.clone(),
            diagnostics: self.diagnostics.clone(),
            reason: "decision loop panicked",
        };

        while !token.is_cancelled() {
            self.collect_inputs();

            let span = tracing::info_span!("cycle", n = self.cycle_count + 1);
            let sleep = self.cycle().instrument(span).await;
            let wait = Duration::from_secs(sleep.duration_secs).max(MIN_WAIT);

            let wake = tokio::select! {
                biased;
                _ = token.cancelled() => Wake::Stop,
                msg = self.input_rx.recv() => match msg {
                    Some(msg) => Wake::Input(msg),
                    None => Wake::Closed,
                },
                _ = tokio::time::sleep(wait) => Wake::Timer,
            };

            match wake {
                Wake::Stop => break,
                Wake::Input(msg) => {
                    tracing::debug!("new input, waking early");
                    self.ingest(msg);
                }
                Wake::Closed => {
                    exit.reason = "input channel closed";
                    break;
                }
                Wake::Timer => {}
            }
        }

        tracing::info!(cycle_count = self.cycle_count, "decision loop stopped");
        self
    }

    /// One evaluation: decide, maybe respond, pick the next wait.
    async fn cycle(&mut self) -> SleepResult {
        self.cycle_count += 1;
        let now = Utc::now();

        let snapshot = self.engagement.snapshot(now);
        let mut decision = self.scorer.decide(&self.conversation, &snapshot, &self.cfg.decision, now);
        if let Some(failure) = self.last_failure.take() {
            decision.reasoning = format!("{}; previous response attempt failed: {failure}", decision.reasoning);
        }

        tracing::info!(
            should_respond = decision.should_respond,
            trigger = ?decision.trigger,
            score = decision.components.weighted_score,
            engagement = %snapshot.level,
            pending = self.conversation.unanswered(),
            "decision made"
        );
        self.dispatch(AgentEvent::Decision(decision.clone()));

        if decision.should_respond {
            match self.respond(&decision).await {
                Ok(text) => {
                    self.conversation.record_response(text.clone(), Utc::now());
                    tracing::info!(chars = text.chars().count(), "response produced");
                    self.dispatch(AgentEvent::Response(text));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "response generation failed");
                    let _ = self.diagnostics.send(Diagnostic::ProviderFailed {
                        cycle: self.cycle_count,
                        message: e.to_string(),
                    });
                    self.last_failure = Some(e.to_string());
                    decision = decision.into_failed(&e);
                }
            }
        }

        let sleep = compute_sleep(&decision, &self.cfg.decision);
        tracing::debug!(duration_secs = sleep.duration_secs, "sleep computed");
        self.dispatch(AgentEvent::Sleep(sleep.clone()));
        sleep
    }

    /// Generate on a separate task so a panicking generator only fails
    /// this cycle.
    async fn respond(&self, decision: &DecisionResult) -> Result<String, ProviderError> {
        let context = ResponseContext {
            system_prompt: self.cfg.system_prompt.clone(),
            history: self.conversation.entries().iter().cloned().collect(),
            pending: self.conversation.pending().len(),
            decision: decision.clone(),
        };
        let generator = self.generator.clone();
        let mut generation = tokio::spawn(async move { generator.generate(&context).await });

        let joined = match self.cfg.response_timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut generation).await {
                Ok(joined) => joined,
                Err(_) => {
                    generation.abort();
                    return Err(ProviderError::Timeout(limit.as_secs()));
                }
            },
            None => generation.await,
        };
        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ProviderError::Panicked(panic_message(e.into_panic().as_ref()))),
            Err(e) => Err(ProviderError::Panicked(e.to_string())),
        }
    }

    fn dispatch(&self, event: AgentEvent) {
        for failure in self.callbacks.dispatch(&event) {
            let _ = self.diagnostics.send(Diagnostic::ObserverFailed(failure));
        }
    }

    /// Drain everything queued since the last cycle.
    fn collect_inputs(&mut self) {
        while let Ok(msg) = self.input_rx.try_recv() {
            self.ingest(msg);
        }
    }

    fn ingest(&mut self, msg: ConversationMessage) {
        self.engagement.record_message(msg.timestamp);
        self.conversation.ingest(msg);
    }
}

/// Marks the agent stopped when the loop ends on its own, including by
/// panic. A cancelled token means `Agent::stop` owns the status.
struct ExitWatch {
    token: CancellationToken,
    status: watch::Sender<AgentStatus>,
    diagnostics: broadcast::Sender<Diagnostic>,
    reason: &'static str,
}

impl Drop for ExitWatch {
    fn drop(&mut self) {
        if self.token.is_cancelled() {
            return;
        }
        tracing::error!(reason = self.reason, "decision loop exited unexpectedly");
        self.status.send_replace(AgentStatus::Stopped);
        let _ = self.diagnostics.send(Diagnostic::LoopExited { reason: self.reason.to_owned() });
    }
}
