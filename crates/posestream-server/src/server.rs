//! `PosestreamServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use posestream_core::{ClientId, DetectorFactory};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_REJECTIONS_TOTAL;
use crate::protocol::ControlAction;
use crate::protocol::envelope;
use crate::registry::{BroadcastReport, ConnectionRegistry};
use crate::session::{SessionContext, SessionInfo};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions.
    pub registry: Arc<ConnectionRegistry>,
    /// Handed to every new session.
    pub session_ctx: SessionContext,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The landmark streaming server.
pub struct PosestreamServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    factory: Arc<dyn DetectorFactory>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl PosestreamServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        factory: Arc<dyn DetectorFactory>,
        metrics: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::with_capacity(config.max_sessions));
        Self {
            config: Arc::new(config),
            registry,
            factory,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            session_ctx: SessionContext {
                registry: self.registry.clone(),
                factory: self.factory.clone(),
                queue_capacity: self.config.queue_capacity,
                shutdown: self.shutdown.token(),
            },
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/sessions", get(sessions_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in the background.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which ends once shutdown is initiated.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, detector = self.factory.name(), "posestream server listening");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Tell every connected client the server is going away.
    pub fn broadcast_shutdown_notice(&self) -> BroadcastReport {
        let notice = Arc::new(envelope::control_message(ControlAction::Stop, None));
        let report = self.registry.broadcast(&notice);
        info!(
            delivered = report.delivered,
            failed = report.failed.len(),
            "shutdown notice broadcast"
        );
        report
    }

    /// Get the session registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.registry.snapshot();
    let frames_processed = sessions.iter().map(|s| s.counters().processed).sum();
    Json(health::health_check(
        state.start_time,
        sessions.len(),
        frames_processed,
        state.session_ctx.factory.name(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /sessions
async fn sessions_handler(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    let mut sessions: Vec<SessionInfo> =
        state.registry.snapshot().iter().map(|s| s.info()).collect();
    sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Json(sessions)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

/// GET /ws: upgrade and hand the socket to a tracked session task.
///
/// Capacity is enforced at registration, so a refused client still gets an
/// `at_capacity` error envelope before the close.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        counter!(WS_REJECTIONS_TOTAL, "reason" => "shutting_down").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }

    let AppState {
        session_ctx,
        config,
        shutdown,
        ..
    } = state;
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| async move {
            let task = shutdown.spawn(run_ws_session(socket, ClientId::new(), session_ctx, config));
            let _ = task.await;
        })
}
