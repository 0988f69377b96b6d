use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use chat_relay::config::{Cli, Config};
use chat_relay::server::routes::{build_router, AppState};
use chat_relay::upstream::mock::MockBackend;
use chat_relay::upstream::openai::OpenAiBackend;
use chat_relay::upstream::CompletionBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "chat_relay=debug,tower_http=debug"
    } else {
        "chat_relay=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
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

    info!("chat-relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    info!(
        model = config.upstream.model,
        api_base = config.upstream.api_base,
        cors_origin = config.server.cors_origin,
        pacing_delay_ms = config.relay.pacing_delay_ms,
        "Configuration loaded"
    );

    // The upstream client is built once and shared by every request.
    let backend: Arc<dyn CompletionBackend> = if cli.mock {
        info!("Using mock backend");
        Arc::new(MockBackend::new())
    } else {
        let api_key = config.upstream.api_key().with_context(|| {
            format!(
                "no API key found; set {} or start with --mock",
                config.upstream.api_key_env
            )
        })?;
        Arc::new(OpenAiBackend::new(&config.upstream, &api_key)?)
    };

    let state = Arc::new(AppState::new(config.clone(), backend));
    let app = build_router(state)?;

    let listen_addr = config.server.listen.clone();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
