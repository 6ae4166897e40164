//! HTTP surface over `agentlock-core`: axum router, request/response DTOs
//! for the five network operations of §6, error mapping, sweeper wiring,
//! and health/metrics endpoints.

pub mod api;
pub mod error;

use agentlock_common::config::AppConfig;
use agentlock_core::coordination::CoordinationApi;
use agentlock_core::kv::KeyValueStore;
use agentlock_core::remote::RemoteRepository;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ServerError;

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub api: Arc<CoordinationApi>,
    pub sweeper_shared_secret: String,
    pub default_ttl_ms: i64,
    pub metrics_handle: PrometheusHandle,
    pub start_time: Instant,
}

/// Assembles the routable app, independent of transport (used by both
/// `run` and the black-box `tests/e2e` crate, which drives it with
/// `tower::ServiceExt::oneshot` instead of a bound listener).
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::routes())
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[allow(clippy::expect_used)]
fn setup_metrics() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// Builds and serves the router, wiring in the sweeper's periodic task.
/// `kv`/`remote` are caller-provided so the binary crate owns credential
/// construction while this crate owns the HTTP surface.
pub async fn run(
    config: AppConfig,
    kv: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteRepository>,
) -> std::result::Result<(), ServerError> {
    let metrics_handle = setup_metrics();
    let api = Arc::new(CoordinationApi::new(
        kv,
        remote,
        config.remote.head_check_min_interval_ms,
    ));

    let sweeper_interval = Duration::from_millis(config.sweeper.interval_ms);
    agentlock_core::sweeper::spawn(api.clone(), sweeper_interval, || chrono::Utc::now().timestamp_millis());

    let app_state = AppState {
        api,
        sweeper_shared_secret: config.sweeper.shared_secret.clone(),
        default_ttl_ms: config.lock.default_ttl_ms,
        metrics_handle,
        start_time: Instant::now(),
    };

    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .map_err(|e| ServerError::Core(agentlock_core::Error::Transient(e.to_string())))?;
    tracing::info!(host = %config.server.host, port = config.server.port, "agentlock server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Core(agentlock_core::Error::Transient(e.to_string())))?;

    Ok(())
}

#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    (StatusCode::OK, axum::Json(response))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}
