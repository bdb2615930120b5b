use std::{io::BufRead, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use client_core::{load_settings, ChannelTransport, ConsoleUpdate, SessionConsole, SessionHandle};
use shared::domain::AiRequestKind;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "copilot-console", about = "Follow one copilot session from the terminal")]
struct Args {
    #[arg(long)]
    session_id: String,
    #[arg(long)]
    join_code: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
enum Command {
    Ask {
        kind: AiRequestKind,
        input: Option<String>,
    },
    End,
    Reconnect,
    Quit,
}

/// `ask [kind] [text]`, `end`, `reconnect`, `quit`. Blank or unknown lines yield `None`.
fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match head.to_ascii_lowercase().as_str() {
        "ask" => {
            let rest = rest.trim();
            let (first, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let (kind, text) = match AiRequestKind::parse_loose(first) {
                Some(kind) => (kind, tail.trim()),
                None => (AiRequestKind::default(), rest),
            };
            Some(Command::Ask {
                kind,
                input: (!text.is_empty()).then(|| text.to_string()),
            })
        }
        "end" => Some(Command::End),
        "reconnect" => Some(Command::Reconnect),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

fn render(update: &ConsoleUpdate) {
    match update {
        ConsoleUpdate::ConnectionChanged(status) => info!(?status, "connection"),
        ConsoleUpdate::SessionStatusChanged(status) => println!("== session {status:?}"),
        ConsoleUpdate::SnapshotApplied {
            paragraphs,
            topics,
            ai_messages,
        } => println!(
            "== caught up: {paragraphs} paragraphs, {topics} topics, {ai_messages} answers"
        ),
        ConsoleUpdate::ParagraphStarted(p) | ConsoleUpdate::ParagraphExtended(p) => {
            println!("[{}] {}", p.id, p.text)
        }
        ConsoleUpdate::InterimChanged(Some(text)) => println!("    ~ {text}"),
        ConsoleUpdate::InterimChanged(None) => {}
        ConsoleUpdate::TopicAdded(topic) => println!("# {}", topic.text),
        ConsoleUpdate::AiMessageUpdated { message, .. } => {
            if !message.streaming {
                println!("AI {}> {}", message.kind.as_str(), message.content);
            }
        }
        ConsoleUpdate::TranscriptReplaced { paragraphs } => {
            println!("== final transcript loaded ({paragraphs} paragraphs)")
        }
        ConsoleUpdate::Error(message) => eprintln!("error: {message}"),
    }
}

/// Terminal status seen and the stored transcript already loaded (or given up on).
fn session_finished<T: ChannelTransport>(console: &SessionConsole<T>) -> bool {
    console
        .store()
        .session_status()
        .is_some_and(|status| status.is_terminal())
        && !console.completion_pending()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref());
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    let mut handle = SessionHandle::new(args.session_id);
    if let Some(code) = args.join_code {
        handle = handle.with_join_code(code);
    }
    if let Some(token) = args.token {
        handle = handle.with_auth_token(token);
    }

    let mut console = SessionConsole::open(handle, settings)?;
    let mut live = match console.connect().await {
        Ok(()) => true,
        Err(err) => {
            warn!(%err, "initial connect failed; type `reconnect` to retry");
            false
        }
    };

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    // Blocking stdin reads stay off the runtime.
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdin_open = true;
    loop {
        tokio::select! {
            update = console.next_update(), if live => {
                let Some(updates) = update else {
                    live = false;
                    eprintln!("disconnected; type `reconnect` to join again");
                    continue;
                };
                updates.iter().for_each(render);
                if session_finished(&console) {
                    break;
                }
            }
            line = line_rx.recv(), if stdin_open => {
                let Some(line) = line else {
                    stdin_open = false;
                    continue;
                };
                match parse_command(&line) {
                    Some(Command::Ask { kind, input }) => {
                        if let Err(err) = console.ask_ai(kind, input.as_deref()) {
                            eprintln!("error: {err}");
                        }
                    }
                    Some(Command::End) => {
                        if let Err(err) = console.end_session() {
                            eprintln!("error: {err}");
                        }
                    }
                    Some(Command::Reconnect) => match console.reconnect().await {
                        Ok(()) => live = true,
                        Err(err) => eprintln!("error: {err}"),
                    },
                    Some(Command::Quit) => break,
                    None => eprintln!("commands: ask [kind] [text] | end | reconnect | quit"),
                }
            }
            else => break,
        }
    }

    console.disconnect().await;
    let transcript = console.store().final_transcript();
    if !transcript.is_empty() {
        println!("\n--- transcript ---\n{transcript}");
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
