//! Enrollment service HTTP server.

use anyhow::Context;
use enrollment_coordinator::CoordinatorEnvironment;
use enrollment_core::environment::SystemClock;
use enrollment_core::stores::{ParticipantStore, ReconciliationLog};
use enrollment_postgres::{PostgresParticipantStore, PostgresReconciliationLog};
use enrollment_registry::reconcile_task::ReconcileTask;
use enrollment_registry::{AppState, Config, TrackServiceClient, build_router};
use enrollment_runtime::metrics::MetricsRecorder;
use enrollment_testing::{InMemoryParticipantStore, InMemoryReconciliationLog};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,enrollment_registry=debug,enrollment_coordinator=debug,sqlx=warn,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting enrollment service");

    let config = Config::from_env();
    let guard = config.call_guard();
    info!(
        address = %config.bind_address(),
        track_service = %config.track_service.url,
        postgres = config.database.is_some(),
        max_retries = guard.retry.max_retries,
        call_timeout = ?guard.call_timeout,
        reconcile_interval = ?config.reconcile_interval(),
        "Configuration loaded"
    );

    let tracks = Arc::new(
        TrackServiceClient::new(&config.track_service.url, config.track_service_timeout())
            .context("building track service client")?,
    );

    let (participants, reconciliations, backend): (
        Arc<dyn ParticipantStore>,
        Arc<dyn ReconciliationLog>,
        &'static str,
    ) = match &config.database {
        Some(database) => {
            info!("Connecting to enrollment database...");
            let pool = enrollment_postgres::connect(&database.url, database.max_connections)
                .await
                .context("connecting to PostgreSQL")?;
            enrollment_postgres::migrate(&pool)
                .await
                .context("running migrations")?;
            info!("Enrollment database ready");
            (
                Arc::new(PostgresParticipantStore::new(pool.clone())),
                Arc::new(PostgresReconciliationLog::new(pool)),
                "postgres",
            )
        },
        None => {
            warn!("DATABASE_URL not set, participants and reconciliation records are kept in memory");
            (
                Arc::new(InMemoryParticipantStore::new()),
                Arc::new(InMemoryReconciliationLog::new()),
                "memory",
            )
        },
    };

    let environment = CoordinatorEnvironment {
        tracks: tracks.clone(),
        capacity: tracks,
        participants,
        reconciliations,
        clock: Arc::new(SystemClock),
        guard,
    };

    let mut state = AppState::new(environment, backend);
    if config.metrics_enabled {
        let mut recorder = MetricsRecorder::new();
        recorder.install().context("installing metrics recorder")?;
        state = state.with_metrics(recorder);
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let reconcile_handle = config.reconcile_interval().map(|every| {
        ReconcileTask::new(state.reconciler.clone(), every, shutdown_rx).spawn()
    });

    let coordinator = state.coordinator.clone();
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(enrollment_web::shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining background work");
    // No receiver left when the reconciler is disabled
    let _ = shutdown_tx.send(());
    if let Some(handle) = reconcile_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Reconciler task failed");
        }
    }
    if let Err(e) = coordinator.shutdown(config.shutdown_timeout()).await {
        warn!(error = %e, "Coordinator did not drain in time");
    }

    info!("Server stopped");
    Ok(())
}
