use clap::Parser;
use exchange_core::cli::{Cli, Commands};
use exchange_core::utils::shutdown_token;
use exchange_core::{api, state::AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Commands::Serve {
        port,
        store_path,
        log_level,
    } = cli.command;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    let state = AppState::new(&store_path).await?;
    let app = api::router(state);

    let token = shutdown_token();
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(%port, store_path, "exchange-core listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    Ok(())
}
