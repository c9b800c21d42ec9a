//! Relaybot CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use relaybot::agent::Relay;
use relaybot::config::Config;
use relaybot::conversation::ConversationStore;
use relaybot::llm::OpenAiBackend;

use std::sync::Arc;

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(about = "A Discord bot that relays mentions to an LLM and remembers each conversation")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let dotenv_path = relaybot::config::load_dotenv();
    init_tracing(cli.debug);
    if let Some(path) = &dotenv_path {
        tracing::debug!(path = %path.display(), "loaded .env file");
    }

    // serenity and reqwest both use rustls; pick the provider once.
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing::info!("starting relaybot");

    let loaded = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "configuration error");
            std::process::exit(1);
        }
    };

    tracing::info!(
        data_dir = %config.data_dir.display(),
        model = %config.llm.model,
        search_model = %config.llm.search_model,
        web_search = config.routing.web_search_enabled,
        history_depth = config.history.depth,
        "configuration loaded"
    );

    let system_prompt = config
        .system_prompt()
        .await
        .context("failed to resolve system prompt")?;

    let store = ConversationStore::open(&config.database_path(), config.history.depth)
        .with_context(|| {
            format!(
                "failed to open conversation store at {}",
                config.database_path().display()
            )
        })?;

    let backend = Arc::new(OpenAiBackend::new(&config.llm).context("failed to build LLM backend")?);
    let relay = Arc::new(Relay::from_config(&config, store, backend, system_prompt));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let health = if config.health.enabled {
        Some(
            relaybot::api::start_health_server(&config.health, shutdown_rx)
                .await
                .context("failed to start health server")?,
        )
    } else {
        None
    };

    tracing::info!("connecting to discord");

    let exit = tokio::select! {
        result = relaybot::messaging::discord::run(&config.discord.token, relay) => {
            result.context("discord client stopped")
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(true);
    if let Some(health) = health
        && let Err(error) = health.task.await
    {
        tracing::warn!(%error, "health server task ended abnormally");
    }

    tracing::info!("relaybot stopped");
    exit
}

/// Compact fmt output, `RUST_LOG` if set, otherwise `info` (`debug` with `--debug`).
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}
