//! Interactive chat loop

use std::io::{self, Write};

use anyhow::Context;
use chat_client::HttpChatBackend;
use chat_core::TurnKey;
use chat_state::Direction;
use colored::Colorize;
use session_manager::{ChatEngine, EngineError, EngineSnapshot};

use crate::render;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    New,
    Open(String),
    Sessions,
    Show,
    Prev(usize),
    Next(usize),
    Version(usize, isize),
    Retry(usize),
    Edit(usize, String),
    Branch(String),
    Model(Option<String>),
    Fix(String, String),
    Help,
    Quit,
}

impl ReplCommand {
    /// Parse one input line. Lines not starting with `/` are messages.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Ok(Self::Quit);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_string()));
        };

        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let args = args.trim();
        match name {
            "new" => Ok(Self::New),
            "open" => non_empty(args, "/open <session-id>").map(Self::Open),
            "sessions" => Ok(Self::Sessions),
            "show" => Ok(Self::Show),
            "prev" => turn_number(args).map(Self::Prev),
            "next" => turn_number(args).map(Self::Next),
            "version" => {
                let (turn, index) = args
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: /version <turn> <version>".to_string())?;
                let index: isize = index
                    .trim()
                    .parse()
                    .map_err(|_| format!("not a version number: {}", index.trim()))?;
                Ok(Self::Version(turn_number(turn)?, index - 1))
            }
            "retry" => turn_number(args).map(Self::Retry),
            "edit" => {
                let (turn, text) = args
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: /edit <turn> <text>".to_string())?;
                Ok(Self::Edit(turn_number(turn)?, non_empty(text, "/edit <turn> <text>")?))
            }
            "branch" => non_empty(args, "/branch <text>").map(Self::Branch),
            "model" => Ok(Self::Model((!args.is_empty()).then(|| args.to_string()))),
            "fix" => {
                let (id, text) = args
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: /fix <message-id> <text>".to_string())?;
                Ok(Self::Fix(id.to_string(), non_empty(text, "/fix <message-id> <text>")?))
            }
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command: /{}", other)),
        }
    }
}

fn non_empty(args: &str, usage: &str) -> Result<String, String> {
    let args = args.trim();
    if args.is_empty() {
        Err(format!("usage: {}", usage))
    } else {
        Ok(args.to_string())
    }
}

fn turn_number(arg: &str) -> Result<usize, String> {
    match arg.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("not a turn number: {}", arg.trim())),
    }
}

fn turn_key(snapshot: &EngineSnapshot, number: usize) -> anyhow::Result<TurnKey> {
    snapshot
        .turns
        .get(number - 1)
        .map(|t| t.key.clone())
        .with_context(|| format!("no turn {}", number))
}

fn print_help() {
    let lines = [
        "/new                     start a new chat",
        "/open <id>               open a session",
        "/sessions                list sessions",
        "/show                    redraw the conversation",
        "/prev <n> | /next <n>    page through turn n's replies",
        "/version <n> <i>         show reply version i of turn n",
        "/retry <n>               regenerate turn n",
        "/edit <n> <text>         rewrite turn n and resend",
        "/branch <text>           start a new chat with <text>",
        "/model [name]            list models, or pick one",
        "/fix <message-id> <text> correct a stored message",
        "/quit                    leave",
    ];
    for line in lines {
        println!("{}", line.dimmed());
    }
}

pub async fn run(engine: ChatEngine<HttpChatBackend>, session: Option<String>) -> anyhow::Result<()> {
    println!("{}", "💬 Branching Chat".cyan().bold());
    println!("{}", "Type /help for commands, /quit to leave".dimmed());

    if let Some(id) = session {
        if let Err(e) = engine.load_session(&id).await {
            println!("{}", format!("❌ {}", e).red());
        }
        render::snapshot(&engine.snapshot().await);
    }

    let mut model: Option<String> = None;
    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        if input.trim().is_empty() {
            continue;
        }

        let command = match ReplCommand::parse(&input) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e.red());
                continue;
            }
        };
        if command == ReplCommand::Quit {
            println!("{}", "👋 Goodbye!".cyan());
            break;
        }

        if let Err(e) = execute(&engine, command, &mut model).await {
            tracing::debug!(error = ?e, "command failed");
            println!("{}", format!("❌ Error: {}", e).red());
        }
        println!();
    }

    Ok(())
}

async fn execute(
    engine: &ChatEngine<HttpChatBackend>,
    command: ReplCommand,
    model: &mut Option<String>,
) -> anyhow::Result<()> {
    let snapshot = engine.snapshot().await;
    let model_ref = model.as_deref();

    match command {
        ReplCommand::Send(text) => {
            let outcome = engine.send(&text, model_ref).await?;
            render::outcome(&outcome);
            show_last(engine).await;
        }
        ReplCommand::New => {
            engine.new_chat().await;
            println!("{}", "Started a new chat".dimmed());
        }
        ReplCommand::Open(id) => {
            engine.load_session(&id).await?;
            render::snapshot(&engine.snapshot().await);
        }
        ReplCommand::Sessions => {
            let sessions = engine.refresh_sessions().await?;
            render::sessions(&sessions, snapshot.session_id.as_deref());
        }
        ReplCommand::Show => render::snapshot(&snapshot),
        ReplCommand::Prev(n) | ReplCommand::Next(n) => {
            let direction = if matches!(command, ReplCommand::Prev(_)) {
                Direction::Previous
            } else {
                Direction::Next
            };
            let key = turn_key(&snapshot, n)?;
            engine.advance(&key, direction).await?;
            show_turn(engine, n).await;
        }
        ReplCommand::Version(n, index) => {
            let key = turn_key(&snapshot, n)?;
            engine.select_version(&key, index).await?;
            show_turn(engine, n).await;
        }
        ReplCommand::Retry(n) => {
            let key = turn_key(&snapshot, n)?;
            let outcome = engine.regenerate(&key, model_ref).await?;
            render::outcome(&outcome);
            show_turn(engine, n).await;
        }
        ReplCommand::Edit(n, text) => {
            let key = turn_key(&snapshot, n)?;
            let outcome = engine.edit(&key, &text, model_ref).await?;
            render::outcome(&outcome);
            show_last(engine).await;
        }
        ReplCommand::Branch(text) => {
            let outcome = engine.branch(&text, model_ref).await?;
            render::outcome(&outcome);
            show_last(engine).await;
        }
        ReplCommand::Model(Some(name)) => match engine.check_model(&name).await {
            Ok(name) => {
                println!("{}", format!("Model set to {}", name).dimmed());
                *model = Some(name);
            }
            Err(EngineError::UnknownModel(name)) => {
                let known: Vec<String> = engine
                    .snapshot()
                    .await
                    .models
                    .into_iter()
                    .map(|m| m.value)
                    .collect();
                println!(
                    "{}",
                    format!("❌ Unknown model {}. Available: {}", name, known.join(", ")).red()
                );
            }
            Err(e) => {
                println!(
                    "{}",
                    format!("⚠️  Could not check the model list ({}); using {} anyway", e, name).yellow()
                );
                *model = Some(name);
            }
        },
        ReplCommand::Model(None) => {
            let current = model_ref.unwrap_or(&engine.settings().default_model).to_string();
            match engine.list_models().await {
                Ok(catalog) => render::models(&catalog, &current),
                Err(e) => {
                    println!("{}", format!("Model: {}", current).dimmed());
                    println!("{}", format!("⚠️  {}", e).yellow());
                }
            }
        }
        ReplCommand::Fix(id, text) => {
            engine.correct_message(&id, &text).await?;
            println!("{}", format!("Updated message {}", id).dimmed());
        }
        ReplCommand::Help => print_help(),
        ReplCommand::Quit => {}
    }
    Ok(())
}

async fn show_turn(engine: &ChatEngine<HttpChatBackend>, number: usize) {
    let snapshot = engine.snapshot().await;
    if let Some(turn) = snapshot.turns.get(number - 1) {
        render::turn(number, turn);
    }
    render::notice(&snapshot);
}

async fn show_last(engine: &ChatEngine<HttpChatBackend>) {
    let snapshot = engine.snapshot().await;
    if let Some(turn) = snapshot.last_turn() {
        render::turn(snapshot.turns.len(), turn);
    }
    render::notice(&snapshot);
    engine.dismiss_notice().await;
}
