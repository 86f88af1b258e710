//! Terminal output for engine snapshots

use chat_client::ModelCatalog;
use chat_core::Session;
use colored::Colorize;
use session_manager::{EngineSnapshot, SendOutcome, TurnView};

pub fn snapshot(snapshot: &EngineSnapshot) {
    match &snapshot.session_id {
        Some(id) => println!("{}", format!("Session: {}", id).dimmed()),
        None => println!("{}", "Session: (new chat)".dimmed()),
    }
    if snapshot.turns.is_empty() {
        println!("{}", "No messages yet".dimmed());
    }
    for (index, turn) in snapshot.turns.iter().enumerate() {
        self::turn(index + 1, turn);
    }
    if snapshot.anomalies > 0 {
        println!(
            "{}",
            format!("⚠ {} message(s) could not be placed cleanly", snapshot.anomalies).yellow()
        );
    }
    notice(snapshot);
}

/// Print one turn. `number` is the 1-based position used by REPL commands.
pub fn turn(number: usize, turn: &TurnView) {
    let prompt = if turn.synthetic {
        "(missing prompt)".dimmed().to_string()
    } else {
        turn.prompt.clone()
    };
    println!("{} {}", format!("[{}] You:", number).cyan().bold(), prompt);

    let label = turn
        .version_label()
        .map(|l| format!(" ({})", l))
        .unwrap_or_default();
    let header = format!("    Assistant{}:", label);

    match &turn.reply {
        None => println!("{} {}", header.green().bold(), "(no reply)".dimmed()),
        Some(reply) if reply.pending => {
            println!("{} {}", header.green().bold(), "…".dimmed())
        }
        Some(reply) if reply.error => println!("{} {}", header.red().bold(), reply.content.red()),
        Some(reply) => println!("{} {}", header.green().bold(), reply.content),
    }
}

pub fn outcome(outcome: &SendOutcome) {
    match outcome {
        SendOutcome::Confirmed { session_id, .. } => {
            println!("{}", format!("✅ Session ID: {}", session_id).green())
        }
        SendOutcome::Failed { error, .. } => println!("{}", format!("❌ {}", error).red()),
        SendOutcome::Stale { session_id } => println!(
            "{}",
            format!("Reply for session {} arrived after switching away", session_id).dimmed()
        ),
    }
}

pub fn notice(snapshot: &EngineSnapshot) {
    if let Some(notice) = &snapshot.notice {
        println!("{}", format!("ℹ {}", notice).yellow());
    }
}

pub fn sessions(sessions: &[Session], active: Option<&str>) {
    if sessions.is_empty() {
        println!("{}", "No sessions".dimmed());
        return;
    }
    for session in sessions {
        let marker = if Some(session.id.as_str()) == active { "*" } else { " " };
        let updated = session
            .updated_at
            .or(session.created_at)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let star = if session.is_starred { " ★" } else { "" };
        println!(
            "{} {}  {}{}  {}",
            marker,
            session.id.cyan(),
            session.title,
            star,
            updated.dimmed()
        );
    }
}

pub fn models(catalog: &ModelCatalog, current: &str) {
    if catalog.is_empty() {
        println!("{}", format!("Model: {} (server lists no models)", current).dimmed());
        return;
    }
    for model in &catalog.models {
        let marker = if model.value == current { "*" } else { " " };
        let default = if catalog.default.as_deref() == Some(model.value.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("{} {}  {}{}", marker, model.value.cyan(), model.label, default.dimmed());
    }
}
