//! tablesight - Capture/Stream/Label Session Controller
//!
//! Main entry point.

use tablesight::session::AnalysisFeed;
use tablesight::state::{AppConfig, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablesight=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting tablesight v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::default();
    tracing::info!(
        stream_addr = %config.stream_addr,
        backend_url = %config.backend_url,
        frame_rate = config.frame_rate,
        capture_mode = ?config.capture_mode,
        "Configuration loaded"
    );

    let state = AppState::build(config);

    // Wire the analysis feed to the streaming observer channel
    let feed = AnalysisFeed::start(state.streaming.register_observer().await);

    // Pull the active layout for detection fallback seeding; the built-in
    // default stays in place when the backend has none
    match state.layout_client.fetch_layout().await {
        Ok(layout) => {
            tracing::info!(layout = %layout.name, "Table layout loaded");
            state.session.set_layout(layout).await;
        }
        Err(e) => tracing::warn!(error = %e, "Layout fetch failed, using built-in default"),
    }

    // Open the duplex stream (retries forever on its own)
    state.streaming.connect().await;

    // Acquire the capture device and start periodic frames
    match state.source.begin().await {
        Ok(()) => {
            state.scheduler.start_periodic(state.config.frame_rate).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Capture device not acquired; frame pipeline idle");
        }
    }

    // Resume training status polling if a job is already underway
    match state.training.refresh().await {
        Ok(job) if job.status.is_active() => {
            tracing::info!(status = ?job.status, "Training job in progress, polling");
            state.training.ensure_polling().await;
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "Training status unavailable"),
    }

    tracing::info!("tablesight running, Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    // Orderly teardown: stop producing, release the device, drop the stream
    state.scheduler.stop().await;
    state.source.end();
    state.streaming.disconnect().await;
    state.session.teardown().await;
    state.training.shutdown().await;
    feed.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
