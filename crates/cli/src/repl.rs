use std::io::{self, Write};

use proactive_core::Agent;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const PROMPT: &str = "You> ";

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

/// Forward typed lines to the agent until `quit`, EOF or cancellation.
pub async fn run(agent: &Agent, token: CancellationToken) -> anyhow::Result<()> {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    spawn_input_thread(line_tx);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = line_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    InputEvent::Line(line) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        if text.eq_ignore_ascii_case("quit") {
                            break;
                        }
                        if !agent.send_message(text) {
                            eprintln!("agent is not running, message dropped");
                        }
                    }
                    InputEvent::Interrupted | InputEvent::Eof => break,
                    InputEvent::Error(err) => {
                        eprintln!("input error: {err}");
                        break;
                    }
                }
            }
        }
    }

    println!();
    Ok(())
}

/// Print an agent event above the prompt line.
pub fn print_event(line: &str) {
    let mut stdout = io::stdout().lock();
    let _ = write!(stdout, "\r\x1b[2K{line}\n{PROMPT}");
    let _ = stdout.flush();
}

/// rustyline blocks, so it gets its own thread.
fn spawn_input_thread(line_tx: mpsc::UnboundedSender<InputEvent>) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        loop {
            let event = match editor.readline(PROMPT) {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    InputEvent::Line(line)
                }
                Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
                Err(ReadlineError::Eof) => InputEvent::Eof,
                Err(e) => InputEvent::Error(e.to_string()),
            };
            let last = !matches!(event, InputEvent::Line(_));
            if line_tx.send(event).is_err() || last {
                break;
            }
        }
    });
}
