// Cadence worker: HTTP API plus the resume scheduler over PostgreSQL

mod api;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Json, Router};
use cadence_engine::{
    Collaborators, EventBroadcaster, ExecutionRunner, HttpCollaborator, PostgresExecutionStore,
    ResumeScheduler,
};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::WorkerConfig;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "cadence_worker=debug,cadence_engine=debug,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("cadence-worker starting...");

    let config = WorkerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size())
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PostgresExecutionStore::new(pool));
    store.migrate().await.context("Failed to run migrations")?;
    tracing::info!("Connected to database");

    let http = Arc::new(HttpCollaborator::new(config.endpoints.clone()));
    let events = Arc::new(EventBroadcaster::new(config.engine.event_capacity));
    let runner = Arc::new(ExecutionRunner::new(
        store.clone(),
        Collaborators::http(http, store.clone()),
        events.clone(),
        config.engine.clone(),
    ));

    let scheduler = Arc::new(ResumeScheduler::new(runner.clone(), config.scheduler.clone()));
    scheduler.start().context("Failed to start resume scheduler")?;

    tracing::info!(
        interval_secs = config.scheduler.interval.as_secs(),
        batch_size = config.scheduler.batch_size,
        max_concurrent = config.engine.max_concurrent_executions,
        "Resume scheduler started"
    );

    let app = Router::new()
        .route("/health", get(health))
        .merge(api::routes(api::AppState::new(runner, events)));

    let app = if !config.cors_origins.is_empty() {
        let origins = config
            .cors_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .with_context(|| format!("Invalid CORS origin: {}", origin))
            })
            .collect::<Result<Vec<_>>>()?;
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::CACHE_CONTROL]),
        )
    } else {
        app
    };

    let app = app.layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    // Waits for the claim phase, then up to the shutdown timeout for resumes
    scheduler
        .stop()
        .await
        .context("Failed to stop resume scheduler")?;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
