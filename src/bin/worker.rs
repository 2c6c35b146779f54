use presence_grader::{
    app_state::AppState,
    config::AppConfig,
    db,
    routes::metrics::describe_metrics,
    services::worker_pool::{spawn_depth_monitor, WorkerPool},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEPTH_SAMPLE_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting scan worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    PrometheusBuilder::new()
        .install()
        .expect("Failed to install Prometheus exporter");
    describe_metrics();

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let state = AppState::connect(&config, db_pool)
        .await
        .expect("Failed to initialize services");

    let pool = WorkerPool::spawn(
        config.worker_concurrency,
        Arc::clone(&state.processor),
        config.poll_interval(),
    );
    let monitor = spawn_depth_monitor(
        Arc::clone(&state.queue),
        DEPTH_SAMPLE_INTERVAL,
        pool.shutdown_signal(),
    );

    tracing::info!(
        concurrency = config.worker_concurrency,
        poll_interval_ms = config.poll_interval_ms,
        "Worker ready, polling for jobs"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, draining in-flight jobs");

    pool.shutdown_and_join().await;
    let _ = monitor.await;
    tracing::info!("Worker stopped");
}
