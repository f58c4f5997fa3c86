//! `proactive`: interactive demo of the proactive conversation agent.
//!
//! Type messages and watch the agent decide on its own when to answer and
//! how long to wait before looking again. `quit` (or Ctrl+D) exits.

mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use proactive_core::{Agent, AgentCfg, DecisionCfg, Diagnostic, KeywordOverlapScorer, LlmResponder};
use proactive_llm::LlmProvider;
use proactive_llm::provider::MockProvider;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const OFFLINE_REPLY: &str = "(offline) I'm here, but no model is configured.";

#[derive(Parser)]
#[command(name = "proactive", about = "A conversation agent that decides when to speak", version)]
struct Cli {
    /// JSON file with decision settings; missing keys take defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model name, routed to an OpenAI-compatible or Anthropic endpoint
    #[arg(short, long, env = "PROACTIVE_LLM_MODEL")]
    model: Option<String>,

    #[arg(short, long, default_value = "You are a helpful AI assistant.")]
    system_prompt: String,

    /// Score relevance by keyword overlap with recent history instead of a neutral 0.5
    #[arg(long)]
    keyword_relevance: bool,

    #[arg(long, default_value_t = 512)]
    max_tokens: u32,

    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Log filter, e.g. `info` or `proactive_core=debug`
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Write JSON logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let decision = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            DecisionCfg::from_json(&raw).with_context(|| format!("loading config {}", path.display()))?
        }
        None => DecisionCfg::default(),
    };

    let responder = LlmResponder::new(provider(cli.model))
        .with_max_tokens(cli.max_tokens)
        .with_temperature(cli.temperature);
    let mut agent = Agent::new(AgentCfg::new(cli.system_prompt, decision), Arc::new(responder))?;
    if cli.keyword_relevance {
        agent = agent.with_relevance(Arc::new(KeywordOverlapScorer::default()));
    }
    register_printers(&agent);
    spawn_diagnostic_printer(&agent);

    let token = CancellationToken::new();
    spawn_sigint_canceler(token.clone());

    agent.start().await;
    println!("=== Proactive agent ===");
    println!("The agent decides when to respond. Type 'quit' to exit.\n");

    let result = repl::run(&agent, token).await;
    agent.stop().await;
    result
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level {:?}", cli.log_level))?;
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true).with_writer(file))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn provider(model: Option<String>) -> Arc<dyn LlmProvider> {
    match model.and_then(proactive_llm::http::for_model) {
        Some(http) => {
            tracing::info!(model = http.model(), "using http provider");
            Arc::new(http)
        }
        None => {
            tracing::warn!("no model or api key configured, answering with canned replies");
            eprintln!("note: set PROACTIVE_LLM_MODEL and PROACTIVE_LLM_API_KEY for real replies");
            Arc::new(MockProvider::new(OFFLINE_REPLY))
        }
    }
}

fn register_printers(agent: &Agent) {
    agent.add_callback(|response| repl::print_event(&format!("AI: {response}")));
    agent.add_sleep_time_callback(|secs, reasoning| repl::print_event(&format!("Sleep: {secs}s - {reasoning}")));
    agent.add_decision_callback(|respond, reasoning| {
        let verdict = if respond { "RESPOND" } else { "WAIT" };
        repl::print_event(&format!("{verdict}: {reasoning}"));
    });
}

fn spawn_diagnostic_printer(agent: &Agent) {
    let mut diagnostics = agent.diagnostics();
    tokio::spawn(async move {
        loop {
            match diagnostics.recv().await {
                Ok(Diagnostic::ProviderFailed { message, .. }) => {
                    repl::print_event(&format!("provider error: {message}"))
                }
                Ok(Diagnostic::LoopExited { reason }) => {
                    repl::print_event(&format!("agent stopped: {reason}"))
                }
                Ok(other) => tracing::debug!(diagnostic = ?other, "diagnostic"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "diagnostics lagged")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_sigint_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            if let Ok(mut sigint) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
                let _ = sigint.recv().await;
                token.cancel();
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });
}
