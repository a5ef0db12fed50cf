//! Agora Chat Server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Read from `--config <path>` or the default locations, then overridden by
//! `AGORA_*` environment variables. `RUST_LOG` overrides the configured level.

use agora::api::{serve, AppState};
use agora::config::{generate_default_config, Config, LoggingConfig};
use agora::models::UserProfile;
use agora::services::{MemoryChatStore, MemoryUserDirectory};
use agora::websocket::{ConnectionHub, Notifier};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "agora")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time chat and notification server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (default)
    Serve,

    /// Print a default config file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::InitConfig => {
            print!("{}", generate_default_config());
            Ok(())
        }
        Commands::Serve => {
            let config = match &cli.config {
                Some(path) => Config::load_with_env(path)
                    .with_context(|| format!("loading config from {}", path.display()))?,
                None => Config::load_default(),
            };
            config.websocket.validate().context("invalid websocket config")?;
            init_tracing(&config.logging);
            run(config).await
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting Agora v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(MemoryChatStore::new());
    let directory = Arc::new(seed_directory());

    // Handle exists before the hub so it can be passed around at startup
    let notifier = Notifier::new();
    let hub = ConnectionHub::start(config.websocket.clone(), store, directory);
    notifier.install(Arc::clone(&hub));

    if config.server.trust_user_header {
        tracing::warn!("Development identity header enabled");
    }

    let state = AppState::new(config, hub, notifier);
    serve(state).await.context("server error")?;

    tracing::info!("Agora stopped");
    Ok(())
}

/// Demo accounts for local runs with the in-memory directory
fn seed_directory() -> MemoryUserDirectory {
    let directory = MemoryUserDirectory::new();
    for (user_id, username, nickname) in [(1, "alice", "Alice"), (2, "bob", "Bob"), (3, "carol", "Carol")] {
        directory.insert(UserProfile {
            user_id,
            username: username.to_string(),
            nickname: nickname.to_string(),
            avatar: String::new(),
        });
    }
    tracing::debug!("Seeded in-memory user directory");
    directory
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("agora={},tower_http=info", logging.level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
