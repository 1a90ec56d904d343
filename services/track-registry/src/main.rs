//! Track service HTTP server.

use anyhow::Context;
use enrollment_core::stores::TrackStore;
use enrollment_postgres::PostgresTrackStore;
use enrollment_runtime::metrics::MetricsRecorder;
use enrollment_testing::InMemoryTrackStore;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use track_registry::{AppState, Config, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,track_registry=debug,sqlx=warn,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting track service");

    let config = Config::from_env();
    info!(
        address = %config.bind_address(),
        postgres = config.database.is_some(),
        metrics = config.metrics_enabled,
        "Configuration loaded"
    );

    let (tracks, backend): (Arc<dyn TrackStore>, &'static str) = match &config.database {
        Some(database) => {
            info!("Connecting to track database...");
            let pool = enrollment_postgres::connect(&database.url, database.max_connections)
                .await
                .context("connecting to PostgreSQL")?;
            enrollment_postgres::migrate(&pool)
                .await
                .context("running migrations")?;
            info!("Track database ready");
            (Arc::new(PostgresTrackStore::new(pool)), "postgres")
        },
        None => {
            warn!("DATABASE_URL not set, tracks are kept in memory and lost on restart");
            (Arc::new(InMemoryTrackStore::new()), "memory")
        },
    };

    let mut state = AppState::new(tracks, backend);
    if config.metrics_enabled {
        let mut recorder = MetricsRecorder::new();
        recorder.install().context("installing metrics recorder")?;
        state = state.with_metrics(recorder);
    }

    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(enrollment_web::shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
