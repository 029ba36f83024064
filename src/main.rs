//! aio-race: race coordinator demos and an Anthropic chat proxy over HTTP.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use aio_race::anthropic::{AnthropicClient, AnthropicError, ChatBackend};
use aio_race::config::{Cli, Command, Config};
use aio_race::race::demo::run_race_demo;
use aio_race::race::RaceCoordinator;
use aio_race::server::routes::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "aio_race=debug,tower_http=debug"
    } else {
        "aio_race=info,tower_http=info"
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("aio-race v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Arc::new(Config::load(&cli.config)?);

    info!(
        cancel_timeout_ms = ?config.race.cancel_timeout_ms,
        decider_delay_ms = config.race.decider_delay_ms,
        dependent_delay_ms = config.race.dependent_delay_ms,
        "Configuration loaded"
    );

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Demo { proceed } => {
            let coordinator = RaceCoordinator::from_config(&config.race);
            let report = run_race_demo(&coordinator, &config.race, proceed).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Serve => serve(&cli, config).await,
    }
}

async fn serve(cli: &Cli, config: Arc<Config>) -> anyhow::Result<()> {
    // The chat route is disabled, not fatal, when the credential is missing.
    let timeout = Duration::from_secs(config.server.request_timeout_secs);
    let chat: Option<Arc<dyn ChatBackend>> = match AnthropicClient::new(&config.anthropic, timeout)
    {
        Ok(client) => {
            info!(endpoint = client.endpoint(), "Anthropic client ready");
            Some(Arc::new(client))
        }
        Err(AnthropicError::MissingApiKey) => {
            warn!("ANTHROPIC_API_KEY not set, /chat/completions will answer 500");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let state = Arc::new(AppState::new(config.clone(), chat)?);
    let app = build_router(state);

    let listen_addr = cli
        .listen
        .clone()
        .unwrap_or_else(|| config.server.listen.clone());
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
