use std::sync::Arc;

use chat_client::HttpChatBackend;
use chat_core::Config;
use clap::{Parser, Subcommand};
use colored::Colorize;
use session_manager::{ChatEngine, EngineSettings};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod render;
mod repl;

#[derive(Parser)]
#[command(name = "chat-cli")]
#[command(about = "Terminal client for the branching chat service")]
#[command(version)]
struct Cli {
    /// Server base URL; overrides config and API_BASE
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Session to open
    #[arg(long, global = true)]
    session: Option<String>,

    /// Model to send with every message
    #[arg(long, global = true)]
    model: Option<String>,

    /// Enable debug mode
    #[arg(long, short, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat
    Chat,
    /// Send a single message
    Send {
        /// Message content
        message: String,
    },
    /// View session history
    History,
    /// List sessions
    Sessions,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(debug)
                .with_file(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let mut config = Config::load();
    if let Some(api_base) = cli.api_base.clone() {
        config.api_base = api_base;
    }
    if let Some(model) = cli.model.clone() {
        config.default_model = model;
    }
    tracing::debug!(api_url = %config.api_url(), model = %config.default_model, "configuration loaded");

    let backend = HttpChatBackend::new(&config)?;
    let engine = ChatEngine::new(Arc::new(backend), EngineSettings::from(&config));

    match cli.command {
        Commands::Chat => repl::run(engine, cli.session).await,
        Commands::Send { message } => send_once(&engine, cli.session, &message).await,
        Commands::History => show_history(&engine, cli.session).await,
        Commands::Sessions => list_sessions(&engine).await,
    }
}

async fn send_once(
    engine: &ChatEngine<HttpChatBackend>,
    session: Option<String>,
    message: &str,
) -> anyhow::Result<()> {
    if let Some(id) = session {
        engine.load_session(&id).await?;
    }

    println!("{}", format!("🚀 Sending message: {}", message).cyan());
    let outcome = engine.send(message, None).await?;
    render::outcome(&outcome);

    let snapshot = engine.snapshot().await;
    if let Some(turn) = snapshot.last_turn() {
        render::turn(snapshot.turns.len(), turn);
    }
    Ok(())
}

async fn show_history(
    engine: &ChatEngine<HttpChatBackend>,
    session: Option<String>,
) -> anyhow::Result<()> {
    let Some(id) = session else {
        println!("{}", "❌ Please provide --session".red());
        return Ok(());
    };
    engine.load_session(&id).await?;
    render::snapshot(&engine.snapshot().await);
    Ok(())
}

async fn list_sessions(engine: &ChatEngine<HttpChatBackend>) -> anyhow::Result<()> {
    let sessions = engine.refresh_sessions().await?;
    render::sessions(&sessions, None);
    Ok(())
}
