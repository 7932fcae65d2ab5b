use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use toolbridge_core::tools::ToolExecutor;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::router::{RouteOutcome, RpcRouter};
use crate::rpc::{self, RpcResponse};
use crate::session::{self, SessionRegistry};
use crate::stream::{event_stream, ServerInfo};

/// Path clients POST envelopes to; advertised in the handshake.
pub const MESSAGES_PATH: &str = "/messages";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub router: Arc<RpcRouter>,
    pub info: ServerInfo,
    pub keepalive: Duration,
}

impl AppState {
    pub fn new(config: &ServerConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        let sessions = Arc::new(SessionRegistry::new(config.max_sessions, config.max_queue));
        let info = ServerInfo {
            name: config.server_name.clone(),
            version: config.server_version.clone(),
        };
        let router = Arc::new(RpcRouter::new(executor, Arc::clone(&sessions), info.clone()));
        Self {
            sessions,
            router,
            info,
            keepalive: config.keepalive_interval(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/sse", get(sse_handler))
        .route(MESSAGES_PATH, post(messages_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and start serving. Returns a handle to shut it down.
pub async fn start(
    config: &ServerConfig,
    executor: Arc<dyn ToolExecutor>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(config, executor);
    let sessions = Arc::clone(&state.sessions);

    let reaper = config.idle_timeout().map(|max_idle| {
        session::start_reaper_task(Arc::clone(&sessions), max_idle, config.reap_interval())
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        keepalive_secs = config.keepalive_interval_secs,
        max_sessions = config.max_sessions,
        "toolbridge server started"
    );

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let app = build_router(state);
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        port: local_addr.port(),
        sessions,
        shutdown,
        server,
        reaper,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    sessions: Arc<SessionRegistry>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    reaper: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Stop accepting, end every open stream and wait for the server to drain.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let closed = self.sessions.close_all();
        tracing::info!(closed, "shutting down");

        if let Some(reaper) = self.reaper {
            reaper.abort();
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, self.server).await.is_err() {
            tracing::warn!("server did not drain within grace period");
        }
    }
}

/// Open an event stream: handshake, then queued results and keepalives.
async fn sse_handler(State(state): State<AppState>) -> Response {
    let guard = match state.sessions.create() {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting stream");
            let body = RpcResponse::error(None, rpc::SERVER_BUSY, e.to_string());
            return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
        }
    };

    let events = event_stream(guard, MESSAGES_PATH.into(), state.info, state.keepalive)
        .map(|message| Ok::<_, Infallible>(Event::default().data(message.to_json())));

    ([(header::CACHE_CONTROL, "no-cache")], Sse::new(events)).into_response()
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    session_id: Option<String>,
}

async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    body: Bytes,
) -> Response {
    let outcome = state.router.handle(query.session_id.as_deref(), &body).await;
    let status = outcome.status();
    match outcome {
        RouteOutcome::Reply(response) | RouteOutcome::Failed { response, .. } => {
            (status, Json(response)).into_response()
        }
        RouteOutcome::Queued => status.into_response(),
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "sessions": state.sessions.count(),
    }))
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "toolbridge running",
        "endpoints": ["/sse", MESSAGES_PATH],
    }))
}
