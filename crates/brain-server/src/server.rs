use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use brain_core::declarations::ProtocolError;
use brain_engine::OrchestrationEngine;

use crate::registry::SessionRegistry;
use crate::session::{SessionController, SessionError};
use crate::transport::{
    self, FrameSource, TransportError, CLOSE_GOING_AWAY, CLOSE_INTERNAL_ERROR, CLOSE_NORMAL,
};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Upper bound on each tool call round trip.
    pub tool_timeout: Duration,
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8089)),
            tool_timeout: Duration::from_secs(180),
            max_send_queue: 256,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
    pub config: Arc<ServerConfig>,
    pub shutdown: CancellationToken,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/sessions", get(sessions_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and start serving. Returns a handle to shut the server down.
pub async fn start(
    config: ServerConfig,
    engine: Arc<dyn OrchestrationEngine>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(SessionRegistry::new());
    let controller = Arc::new(SessionController::new(
        engine,
        Arc::clone(&registry),
        config.tool_timeout,
    ));
    let shutdown = CancellationToken::new();

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    let local_addr = listener.local_addr()?;

    let router = build_router(AppState {
        controller,
        config: Arc::new(config),
        shutdown: shutdown.clone(),
    });

    tracing::info!(addr = %local_addr, "brain server started");

    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        registry,
        shutdown,
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections, end live sessions, and wait for the
    /// server task.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            tracing::error!(error = %e, "server task failed");
        }
        tracing::info!("brain server stopped");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One connection is one session.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut source, writer) = transport::ws::split(
        socket,
        state.config.max_send_queue,
        state.config.heartbeat_interval,
    );
    tracing::debug!("websocket connected");

    let outcome = tokio::select! {
        outcome = async {
            let first = match source.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(SessionError::Protocol(ProtocolError::NoRunRequest)),
                Err(TransportError::Decode(e)) => {
                    return Err(SessionError::Protocol(ProtocolError::Malformed(e)))
                }
                Err(e) => return Err(SessionError::Transport(e)),
            };
            state.controller.run_session(first, sender.clone(), source).await
        } => Some(outcome),
        _ = state.shutdown.cancelled() => None,
    };

    match outcome {
        Some(Ok(_)) => sender.close(CLOSE_NORMAL, "session complete"),
        Some(Err(SessionError::Protocol(ProtocolError::NoRunRequest))) => {
            tracing::debug!("peer disconnected before run_request");
        }
        Some(Err(e)) => sender.close(CLOSE_INTERNAL_ERROR, e.to_string()),
        None => sender.close(CLOSE_GOING_AWAY, "server shutting down"),
    }
    drop(sender);

    if let Err(e) = writer.await {
        tracing::error!(error = %e, "websocket writer task failed");
    }
    tracing::debug!("websocket closed");
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "active_sessions": state.controller.registry().count(),
    }))
}

/// Live sessions.
async fn sessions_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.registry().summaries())
}
