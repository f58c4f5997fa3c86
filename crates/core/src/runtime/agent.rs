use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::callbacks::{CallbackId, CallbackRegistry, Observer};
use super::scheduler::DecisionLoop;
use crate::cognition::{DecisionScorer, LlmResponder, ResponseGenerator};
use crate::config::AgentCfg;
use crate::dialogue::RelevanceScorer;
use crate::error::ConfigError;
use crate::types::{AgentStatus, ConversationMessage, DecisionResult, Diagnostic, SleepResult};
use proactive_llm::LlmProvider;

const DIAGNOSTIC_BUFFER: usize = 64;

struct Running {
    token: CancellationToken,
    handle: JoinHandle<DecisionLoop>,
}

#[derive(Default)]
struct Control {
    /// Loop state while stopped.
    parked: Option<DecisionLoop>,
    running: Option<Running>,
}

/// A proactive conversation agent.
///
/// Decides on its own when to answer and when to look again. Feed it with
/// [`Agent::send_message`], observe it through the callback methods, and
/// drive its lifecycle with [`Agent::start`] / [`Agent::stop`]. Must be used
/// from within a tokio runtime.
pub struct Agent {
    cfg: Arc<AgentCfg>,
    generator: Arc<dyn ResponseGenerator>,
    scorer: DecisionScorer,
    callbacks: Arc<CallbackRegistry>,
    diagnostics: broadcast::Sender<Diagnostic>,
    status_tx: watch::Sender<AgentStatus>,
    input_tx: Mutex<mpsc::UnboundedSender<ConversationMessage>>,
    control: tokio::sync::Mutex<Control>,
}

impl Agent {
    /// Validate `cfg` and build a stopped agent.
    pub fn new(cfg: AgentCfg, generator: Arc<dyn ResponseGenerator>) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let cfg = Arc::new(cfg);
        let callbacks = Arc::new(CallbackRegistry::new());
        let (diagnostics, _) = broadcast::channel(DIAGNOSTIC_BUFFER);
        let (status_tx, _) = watch::channel(AgentStatus::Stopped);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let scorer = DecisionScorer::default();

        let parked = DecisionLoop::new(
            cfg.clone(),
            scorer.clone(),
            generator.clone(),
            callbacks.clone(),
            diagnostics.clone(),
            status_tx.clone(),
            input_rx,
        );

        Ok(Self {
            cfg,
            generator,
            scorer,
            callbacks,
            diagnostics,
            status_tx,
            input_tx: Mutex::new(input_tx),
            control: tokio::sync::Mutex::new(Control { parked: Some(parked), running: None }),
        })
    }

    /// Build an agent that answers through `provider`.
    pub fn with_provider(cfg: AgentCfg, provider: Arc<dyn LlmProvider>) -> Result<Self, ConfigError> {
        Self::new(cfg, Arc::new(LlmResponder::new(provider)))
    }

    /// Score context relevance with `scorer` instead of the neutral default.
    pub fn with_relevance(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = DecisionScorer::new(Some(scorer));
        if let Some(parked) = self.control.get_mut().parked.as_mut() {
            parked.scorer = self.scorer.clone();
        }
        self
    }

    pub fn config(&self) -> &AgentCfg {
        &self.cfg
    }

    /// Spawn the decision loop. Returns false if it was already running.
    pub async fn start(&self) -> bool {
        let mut control = self.control.lock().await;
        if let Some(running) = &control.running {
            if !running.token.is_cancelled() && !running.handle.is_finished() {
                tracing::warn!("start ignored, agent already running");
                return false;
            }
            // an interrupted stop or a loop that ended on its own
            Self::reap(&mut control).await;
        }

        let decision_loop = match control.parked.take() {
            Some(parked) => parked,
            None => self.fresh_loop(),
        };
        let token = CancellationToken::new();
        self.status_tx.send_replace(AgentStatus::Running);
        let handle = tokio::spawn(decision_loop.run(token.clone()));
        control.running = Some(Running { token, handle });
        tracing::info!("agent started");
        true
    }

    /// Stop the loop and wait for its in-flight cycle to finish.
    ///
    /// Idempotent and safe to cancel: a dropped `stop` leaves the task
    /// tracked, and the next `stop` or `start` waits for it. Once this
    /// returns no observer will be called again until the next
    /// [`Agent::start`].
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        let Some(running) = &control.running else {
            return;
        };

        self.status_tx.send_replace(AgentStatus::Stopping);
        running.token.cancel();
        Self::reap(&mut control).await;
        self.status_tx.send_replace(AgentStatus::Stopped);
        tracing::info!("agent stopped");
    }

    /// Wait for the loop task, then park its state. The handle stays in
    /// `control` until the task is done.
    async fn reap(control: &mut Control) {
        let Some(running) = control.running.as_mut() else {
            return;
        };
        running.token.cancel();
        let joined = (&mut running.handle).await;
        control.running = None;
        match joined {
            Ok(decision_loop) => control.parked = Some(decision_loop),
            Err(e) => tracing::error!(error = %e, "decision loop task failed, conversation state lost"),
        }
    }

    /// Queue a user message for the next cycle and wake the loop.
    ///
    /// Never blocks. Returns false, and publishes a diagnostic, when the
    /// agent is not running and the message was dropped.
    pub fn send_message(&self, text: impl Into<String>) -> bool {
        let message = ConversationMessage::user(text);
        let status = *self.status_tx.borrow();
        if status != AgentStatus::Running {
            tracing::warn!(?status, "message dropped, agent not running");
            let _ = self.diagnostics.send(Diagnostic::MessageDropped { content: message.content, status });
            return false;
        }

        let tx = self.input_tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.send(message) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                tracing::warn!("message dropped, decision loop gone");
                let _ = self.diagnostics.send(Diagnostic::MessageDropped { content: message.content, status });
                false
            }
        }
    }

    /// Observe every produced response.
    pub fn add_callback<F>(&self, f: F) -> CallbackId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.register(Observer::Response(Arc::new(f)))
    }

    /// Observe every decision as `(should_respond, reasoning)`.
    pub fn add_decision_callback<F>(&self, f: F) -> CallbackId
    where
        F: Fn(bool, &str) + Send + Sync + 'static,
    {
        self.callbacks.register(Observer::Decision(Arc::new(move |d: &DecisionResult| {
            f(d.should_respond, &d.reasoning)
        })))
    }

    /// Observe every computed wait as `(seconds, reasoning)`.
    pub fn add_sleep_time_callback<F>(&self, f: F) -> CallbackId
    where
        F: Fn(u64, &str) + Send + Sync + 'static,
    {
        self.callbacks.register(Observer::Sleep(Arc::new(move |s: &SleepResult| {
            f(s.duration_secs, &s.reasoning)
        })))
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        self.callbacks.unregister(id)
    }

    /// The registry itself, for observers that want the full payloads.
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Recovered failures: observer panics, provider errors, dropped input.
    pub fn diagnostics(&self) -> broadcast::Receiver<Diagnostic> {
        self.diagnostics.subscribe()
    }

    pub fn status(&self) -> AgentStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AgentStatus> {
        self.status_tx.subscribe()
    }

    /// Replacement loop after the previous task died; history starts over.
    fn fresh_loop(&self) -> DecisionLoop {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        *self.input_tx.lock().unwrap_or_else(PoisonError::into_inner) = input_tx;
        DecisionLoop::new(
            self.cfg.clone(),
            self.scorer.clone(),
            self.generator.clone(),
            self.callbacks.clone(),
            self.diagnostics.clone(),
            self.status_tx.clone(),
            input_rx,
        )
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if let Some(running) = self.control.get_mut().running.take() {
            running.token.cancel();
        }
    }
}
