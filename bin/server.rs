// Quake Ingest - Web Server
// Read-only live view over HTTP, plus a guarded refresh trigger

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use quake_ingest::{
    init_logging, open_feed, IngestConfig, IngestEngine, IngestError, IngestSummary, LiveView,
    Quake, SqliteStore,
};

const BIND_ADDR: &str = "0.0.0.0:3000";

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<IngestEngine<SqliteStore>>>,
    view: LiveView,
    feed_path: Option<PathBuf>,
    refreshing: Arc<AtomicBool>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

#[derive(Serialize)]
struct QuakesResponse {
    total: usize,
    generation: u64,
    quakes: Vec<Quake>,
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

/// Clears the in-flight flag however the refresh ends
struct RefreshGuard(Arc<AtomicBool>);

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/quakes - Live view snapshot, newest first
async fn get_quakes(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let snapshot = state.view.snapshot();
    let limit = params.limit.unwrap_or(snapshot.len());

    Json(ApiResponse::ok(QuakesResponse {
        total: snapshot.len(),
        generation: snapshot.generation(),
        quakes: snapshot.quakes().iter().take(limit).cloned().collect(),
    }))
}

/// POST /api/refresh - Re-ingest the configured feed; one refresh at a time
async fn refresh(State(state): State<AppState>) -> Response {
    let Some(feed_path) = state.feed_path.clone() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("No feed configured (set QUAKES_FEED)")),
        )
            .into_response();
    };

    if state.refreshing.swap(true, Ordering::SeqCst) {
        debug!("Refresh already in flight, discarding trigger");
        return (
            StatusCode::CONFLICT,
            Json(ApiResponse::error("Refresh already in progress")),
        )
            .into_response();
    }
    let guard = RefreshGuard(Arc::clone(&state.refreshing));

    let engine = Arc::clone(&state.engine);
    let outcome = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
        engine.ingest_source(|| open_feed(&feed_path))
    })
    .await;

    match outcome {
        Ok(Ok(summary)) => (StatusCode::OK, Json(ApiResponse::<IngestSummary>::ok(summary))).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "Refresh failed");
            let status = match e {
                IngestError::SourceUnreadable(_) => StatusCode::BAD_GATEWAY,
                IngestError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                IngestError::BatchCommitFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ApiResponse::error(e.to_string()))).into_response()
        }
        Err(e) => {
            error!(error = %e, "Refresh worker panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Refresh worker failed")),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IngestConfig::from_env()?;
    init_logging(&config.log)?;

    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    let mut engine = IngestEngine::new(store, config.validated_batch_size()?)?;
    engine.on_change(|| debug!("Live view changed"));
    let view = engine.live_view();

    info!(
        database = %config.database_path.display(),
        quakes = view.len(),
        feed = ?config.feed_path,
        "Database opened"
    );

    let state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        view,
        feed_path: config.feed_path.clone(),
        refreshing: Arc::new(AtomicBool::new(false)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/quakes", get(get_quakes))
        .route("/refresh", post(refresh))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(BIND_ADDR)
        .await
        .with_context(|| format!("Failed to bind to {}", BIND_ADDR))?;

    info!(addr = BIND_ADDR, "Server running");

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
