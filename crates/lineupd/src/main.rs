use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(bind = %config.bind_addr, "lineupd starting");

    let policy = config::ThresholdPolicy::load(config.thresholds_path.as_deref());
    tracing::info!(
        login = policy.login,
        watchlist = policy.watchlist,
        duplicate = policy.duplicate,
        "threshold policy loaded"
    );

    let key = lineup_store::SealKey::load_or_generate(&config.seal_key_path)?;
    let store = lineup_store::SqliteDescriptorStore::open(&config.db_path, key).await?;

    let engine = engine::spawn_engine(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )?;

    let state = http::AppState {
        service: Arc::new(lineup_core::RecognitionService::new(engine, store)),
        policy,
        normalize: lineup_imaging::NormalizeOptions {
            max_width: config.max_image_width,
            max_height: config.max_image_height,
            jpeg_quality: config.jpeg_quality,
        },
        op_timeout: Duration::from_secs(config.op_timeout_secs),
        search_limit: config.search_limit,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "lineupd ready");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("lineupd shutting down");
        })
        .await?;

    Ok(())
}
