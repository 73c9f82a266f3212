//! # HTTP API
//!
//! Axum server exposing the agent loop, the SQL sub-interface and the
//! health and metrics endpoints.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /api/agent/iterate` | one agent iteration |
//! | `GET /api/agent/sessions/{id}` | session record |
//! | `POST /api/agent/sessions/{id}/abort` | abort a session |
//! | `GET /api/agent/sessions/{id}/messages` | conversation, oldest first |
//! | `GET /api/agent/sessions/{id}/blackboard` | journal, most recent first |
//! | `POST /api/sql` | SQL action on a target database |
//! | `GET /healthz`, `/readyz`, `/metrics` | health and metrics |

mod extract;
pub(crate) mod middleware_auth;
mod routes_agent;
mod routes_health;
mod routes_sql;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};

use crate::access::JwtRoleLookup;
use crate::agent::{ConfiguredRouter, Orchestrator, PgToolRunners, ToolRunnerFactory};
use crate::config::AppConfig;
use crate::connection::managed::ProviderApi;
use crate::connection::ConnectionResolver;
use crate::db::Database;
use crate::prom_metrics::Metrics;

/// Model calls can take minutes; everything else is bounded well below this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const BODY_LIMIT: usize = 2 * 1024 * 1024;

pub struct AppState {
    /// Application store, when running against Postgres; used by `/readyz`.
    pub db: Option<Database>,
    pub orchestrator: Orchestrator,
    pub tools: Arc<dyn ToolRunnerFactory>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Production wiring: every seam backed by the application database,
    /// the configured model keys and the managed-database provider.
    pub fn from_config(db: Database, config: &AppConfig) -> Arc<Self> {
        let metrics = Arc::new(Metrics::new());
        let resolver = Arc::new(ConnectionResolver::new(
            Arc::new(JwtRoleLookup::new(db.clone(), config.jwt_secret.clone())),
            Arc::new(db.clone()),
            Arc::new(ProviderApi::new(
                db.clone(),
                config.managed_db_api_url.clone(),
                config.managed_db_api_key.clone(),
            )),
            config.encryption_key.clone(),
            config.fallback_database.clone(),
        ));
        let tools: Arc<dyn ToolRunnerFactory> = Arc::new(PgToolRunners);
        let orchestrator = Orchestrator::new(
            Arc::new(db.clone()),
            resolver,
            Arc::new(ConfiguredRouter::from_config(config)),
            tools.clone(),
            config.default_model.clone(),
            config.max_output_tokens,
        )
        .with_metrics(metrics.clone());
        Arc::new(AppState {
            db: Some(db),
            orchestrator,
            tools,
            metrics,
        })
    }
}

/// Records request latency, and wraps each request in a span carrying a
/// request id (propagated from `x-request-id` or generated).
async fn request_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state.metrics.observe_http(
        &method,
        &normalize_path(&raw_path),
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse UUID and numeric path segments so histogram labels stay bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else if uuid::Uuid::parse_str(seg).is_ok() {
                ":uuid".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/agent/iterate", post(routes_agent::handler_iterate))
        .route("/api/agent/sessions/{id}", get(routes_agent::handler_session_get))
        .route("/api/agent/sessions/{id}/abort", post(routes_agent::handler_session_abort))
        .route(
            "/api/agent/sessions/{id}/messages",
            get(routes_agent::handler_session_messages),
        )
        .route(
            "/api/agent/sessions/{id}/blackboard",
            get(routes_agent::handler_session_blackboard),
        )
        .route("/api/sql", post(routes_sql::handler_sql))
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(state.clone(), request_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        .with_state(state)
}

pub async fn run(port: u16, config: AppConfig) -> Result<()> {
    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required to serve"))?;
    let database = Database::connect(&database_url).await?;
    info!(config = ?config, "configuration loaded");
    let state = AppState::from_config(database, &config);
    let app = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "pgpilot API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("pgpilot API shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
