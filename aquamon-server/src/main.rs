use std::path::PathBuf;
use std::sync::Arc;

use aquamon_engine::{NoopModel, Predictor};
use aquamon_server::{
    api::api_router,
    config::Config,
    history::SnapshotHistory,
};
use clap::Parser;
use jiff::tz::TimeZone;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "aquamon-server")]
#[command(about = "Aquamon pond water-quality server")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "aquamon.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let timezone = match &config.timezone {
        Some(name) => TimeZone::get(name)?,
        None => TimeZone::system(),
    };

    // Trained model backends plug in here; until one is wired up every
    // forecast takes the persistence-drift fallback.
    let predictor = Arc::new(Predictor::new(config.engine, Arc::new(NoopModel))?);
    let history = SnapshotHistory::new(config.history_capacity);

    let app = api_router(predictor, history, timezone);

    let listener = TcpListener::bind(config.server.http_addr).await?;
    info!(http_addr = %config.server.http_addr, "HTTP server listening");

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(async move {
            cancel_clone.cancelled().await;
        }) => {
            if let Err(e) = result {
                tracing::error!(error = ?e, "HTTP server error");
            }
            info!("HTTP server shut down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
        }
    }

    Ok(())
}
