//! Echo CLI
//!
//! Terminal chat surface for one Echo conversation. Drives the session
//! core over its handle and renders events as they stream in; the
//! history pane doubles as the "panel" for the citation reveal flow.

use std::io::Write as _;

use anyhow::Context;
use clap::Parser;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use echo_protocol::{ChatMessage, ConversationId, Role};
use echo_session::reveal::{self, RevealHandle};
use echo_session::supervisor::ConnectionState;
use echo_session::{
    citation, logging, ActionResolution, ApiClient, Config, EchoApi, HistoryLoad, SendOutcome,
    SessionEvent, SessionHandle, WsDialer,
};

#[derive(Parser, Debug)]
#[command(name = "echo", about = "Chat with the Echo assistant from the terminal")]
struct Cli {
    /// Conversation to join; a fresh one is created when omitted
    chat_id: Option<String>,

    /// Override the WebSocket URL
    #[arg(long)]
    ws_url: Option<String>,

    /// Override the HTTP API URL
    #[arg(long)]
    api_url: Option<String>,

    /// Override the sender identity
    #[arg(long)]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logging = logging::init_logging().context("initialize logging")?;

    let mut config = Config::from_env();
    if let Some(ws_url) = cli.ws_url {
        config.ws_url = ws_url;
    }
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(user) = cli.user {
        config.user_id = user;
    }

    let chat_id = cli
        .chat_id
        .map(ConversationId::new)
        .unwrap_or_else(ConversationId::random);
    println!(
        "{} {}",
        style("conversation").dim(),
        style(chat_id.as_str()).bold()
    );

    let api = ApiClient::new(&config.api_url, &config.user_id).context("build api client")?;
    let (session, mut events, session_task) =
        SessionHandle::spawn(WsDialer, api.clone(), &config, chat_id);

    // The history pane starts collapsed; /goto opens it on demand.
    let (reveal, mut reveal_effects, _reveal_task) = reveal::spawn(false);

    match session.load_history().await {
        Ok(HistoryLoad::Loaded(count)) => {
            for message in session.snapshot().messages.iter() {
                print_message(message);
            }
            println!("{}", style(format!("{count} messages from history")).dim());
            reveal.list_ready().await;
        }
        Ok(HistoryLoad::SkippedNonEmpty) => {}
        Err(e) => {
            println!("{}", style(format!("history unavailable: {e}")).red());
            reveal.list_ready().await;
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if !handle_line(line.trim(), &session, &reveal, &api).await {
                    break;
                }
                prompt();
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
            }
            effect = reveal_effects.recv() => {
                let Some(effect) = effect else { break };
                apply_reveal_effect(effect, &session, &reveal).await;
            }
        }
    }

    session.teardown().await;
    let _ = session_task.await;
    Ok(())
}

fn prompt() {
    print!("{} ", style(">").cyan());
    let _ = std::io::stdout().flush();
}

/// Returns false when the loop should exit
async fn handle_line(
    line: &str,
    session: &SessionHandle,
    reveal: &RevealHandle,
    api: &ApiClient,
) -> bool {
    match line {
        "" => {}
        "/quit" | "/q" => return false,
        "/history" => match session.load_history().await {
            Ok(HistoryLoad::Loaded(count)) => {
                for message in session.snapshot().messages.iter() {
                    print_message(message);
                }
                println!("{}", style(format!("{count} messages from history")).dim());
            }
            Ok(HistoryLoad::SkippedNonEmpty) => {
                println!("{}", style("history already loaded").dim());
            }
            Err(e) => println!("{}", style(format!("history unavailable: {e}")).red()),
        },
        "/accept" => match session.resolve_action(true).await {
            Ok(ActionResolution::Committed { todos }) => {
                println!("{}", style(format!("committed {todos} todo(s)")).green());
            }
            Ok(ActionResolution::Declined) => {}
            Err(e) => println!("{}", style(format!("could not commit: {e}")).red()),
        },
        "/decline" => match session.resolve_action(false).await {
            Ok(_) => println!("{}", style("proposal declined").dim()),
            Err(e) => println!("{}", style(format!("nothing to decline: {e}")).red()),
        },
        "/reconnect" => {
            session.reconnect().await;
        }
        other if other.starts_with("/goto ") => {
            match other["/goto ".len()..].trim().parse::<i64>() {
                Ok(target) => reveal.activate(target).await,
                Err(_) => println!("{}", style("usage: /goto <message-id>").red()),
            }
        }
        other if other.starts_with("/remove ") => {
            let todo_id = other["/remove ".len()..].trim();
            match api.remove_todo(todo_id).await {
                Ok(()) => println!("{}", style(format!("removed {todo_id}")).dim()),
                Err(e) => println!("{}", style(format!("could not remove: {e}")).red()),
            }
        }
        other if other.starts_with('/') => {
            println!(
                "{}",
                style(
                    "commands: /history /accept /decline /reconnect /goto <id> /remove <todo> /quit"
                )
                .dim()
            );
        }
        text => {
            if let SendOutcome::RolledBack { text, reason } = session.send(text).await {
                println!(
                    "{} {}",
                    style(format!("not delivered ({reason}); restored:")).red(),
                    text
                );
            }
        }
    }
    true
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Appended(message) => print_message(message),
        SessionEvent::RolledBack { id, reason } => {
            warn!(
                component = "cli",
                event = "cli.message.rolled_back",
                message_id = id,
                reason = %reason,
            );
        }
        SessionEvent::ActionProposed { kind } => {
            println!(
                "{}",
                style(format!(
                    "assistant proposed an action ({kind:?}); /accept or /decline"
                ))
                .yellow()
            );
        }
        SessionEvent::Connection(state) => print_connection(state),
    }
}

fn print_message(message: &ChatMessage) {
    let who = match message.role {
        Role::User => style("you").cyan(),
        Role::Assistant => style("echo").green(),
    };
    let content = citation::render_plain(&message.content, &message.quotes);
    println!("{} {} {}", style(message.id).dim(), who, content);
}

fn print_connection(state: &ConnectionState) {
    let line = match state {
        ConnectionState::Idle => return,
        ConnectionState::Connecting => style("connecting...".to_string()).dim(),
        ConnectionState::Open => style("connected".to_string()).green().dim(),
        ConnectionState::Closed => style("connection closed".to_string()).dim(),
        ConnectionState::Failed { reason } => {
            style(format!("connection failed: {reason} (/reconnect to retry)")).red()
        }
    };
    println!("{line}");
}

async fn apply_reveal_effect(
    effect: reveal::Effect,
    session: &SessionHandle,
    reveal: &RevealHandle,
) {
    match effect {
        reveal::Effect::RequestPanelOpen => {
            println!("{}", style("opening history pane").dim());
            reveal.panel_opened().await;
        }
        reveal::Effect::RequestLocate { target, generation } => {
            let snapshot = session.snapshot();
            let position = snapshot.messages.iter().position(|m| m.id == target);
            reveal.locate_result(generation, position).await;
            if position.is_none() {
                println!("{}", style(format!("message {target} is not in this log")).dim());
            }
        }
        reveal::Effect::ScrollTo { position } => {
            let snapshot = session.snapshot();
            // Re-print the target with a little context, like scrolling to it.
            let from = position.saturating_sub(2);
            for message in snapshot.messages.iter().skip(from).take(position - from) {
                print_message(message);
            }
        }
        reveal::Effect::SetHighlight { target } => {
            let snapshot = session.snapshot();
            if let Some(message) = snapshot.messages.iter().find(|m| m.id == target) {
                let content = citation::render_plain(&message.content, &message.quotes);
                println!("{}", style(format!("{} {}", message.id, content)).on_yellow().black());
            }
        }
        reveal::Effect::ClearHighlight => {}
        // Timer effects never leave the coordinator.
        reveal::Effect::StartSettleTimer { .. } | reveal::Effect::StartHighlightTimer { .. } => {}
    }
}
