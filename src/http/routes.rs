use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::header::{HeaderName, AUTHORIZATION};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::control::{CommandDescriptor, CommandTable, ControlRequest, ControlResponse, Session};
use crate::engine::{BridgeHandle, EngineState, IdleStats};
use crate::error::ControlError;
use crate::managers::NotificationStats;
use crate::relay::RelayStats;

use super::sse;

const TOKEN_PARAM: &str = "token";

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub bridge: Arc<BridgeHandle>,
    table: &'static CommandTable,
    token: Option<Arc<String>>,
}

impl HttpState {
    /// `token` of `None` leaves the server open.
    pub fn new(bridge: Arc<BridgeHandle>, token: Option<String>) -> Self {
        Self {
            bridge,
            table: CommandTable::global(),
            token: token.filter(|t| !t.is_empty()).map(Arc::new),
        }
    }

    fn authorize(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<(), HttpServerError> {
        let Some(expected) = &self.token else {
            return Ok(());
        };
        match extract_token(headers, query_token) {
            Some(value) if value == **expected => Ok(()),
            _ => Err(HttpServerError::Unauthorized),
        }
    }
}

/// Query payload for extracting token from URL.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub token: Option<String>,
}

/// Errors raised by the HTTP layer itself, outside any session.
#[derive(Debug)]
pub enum HttpServerError {
    Unauthorized,
    Internal(String),
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Unauthorized => ControlError::Unauthorized,
            Self::Internal(reason) => ControlError::Internal { reason },
        };
        ControlResponse::from_error(&err).into_response()
    }
}

/// Health endpoint response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine_state: EngineState,
    pub callbacks_installed: bool,
    pub uptime_ms: u64,
    pub pending_file_requests: usize,
    pub idle: IdleStats,
    pub relay: RelayStats,
    pub notifications: NotificationStats,
}

/// Operation listing payload.
#[derive(Debug, Serialize)]
pub struct OperationList {
    pub operations: Vec<CommandDescriptor>,
}

/// Build the Axum router with all handlers.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(list_operations))
        .route("/health", get(health))
        .route("/events", get(events))
        .route("/:operation", get(dispatch).post(dispatch))
        .with_state(state)
}

/// Run the HTTP server loop until `shutdown` resolves.
pub async fn run_http_server(
    state: HttpState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding control HTTP listener on {}", addr))?;
    tracing::info!(
        addr = %listener.local_addr().context("reading bound address")?,
        auth = state.token.is_some(),
        "control HTTP server listening"
    );
    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("serving control HTTP router")?;
    Ok(())
}

pub async fn list_operations(
    State(state): State<HttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<OperationList>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(Json(OperationList {
        operations: state.table.descriptors(),
    }))
}

pub async fn health(
    State(state): State<HttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<HealthResponse>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    let bridge = &state.bridge;
    Ok(Json(HealthResponse {
        status: "ok",
        engine_state: bridge.engine_state(),
        callbacks_installed: bridge.callbacks_installed(),
        uptime_ms: bridge.uptime_ms(),
        pending_file_requests: bridge.pending_file_requests().len(),
        idle: bridge.idle_pump().stats(),
        relay: bridge.relay().stats(),
        notifications: bridge.notifications().stats(),
    }))
}

pub async fn events(
    State(state): State<HttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<sse::NotificationStream, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(sse::notifications(&state.bridge))
}

/// Answer one control operation.
///
/// The session runs on the blocking pool: engine operations may do file or
/// device I/O.
pub async fn dispatch(
    State(state): State<HttpState>,
    Path(operation): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<ControlResponse, HttpServerError> {
    let query_token = params
        .iter()
        .find(|(key, _)| key == TOKEN_PARAM)
        .map(|(_, value)| value.as_str());
    state.authorize(&headers, query_token)?;

    let params: Vec<(String, String)> = params
        .into_iter()
        .filter(|(key, _)| key != TOKEN_PARAM)
        .collect();
    let request = ControlRequest::new(operation, params);
    let request_id = request.id();
    tracing::debug!(request_id, operation = request.operation(), "dispatching");

    let bridge = Arc::clone(&state.bridge);
    let table = state.table;
    tokio::task::spawn_blocking(move || Session::new(&bridge, table, request).respond())
        .await
        .map_err(|err| {
            tracing::error!(request_id, error = %err, "session task failed");
            HttpServerError::Internal(format!("session task failed: {}", err))
        })
}

fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = query_token {
        return Some(token.to_string());
    }

    static X_BRIDGE_TOKEN: HeaderName = HeaderName::from_static("x-bridge-token");

    headers
        .get(&X_BRIDGE_TOKEN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.strip_prefix("Bearer ").map(|v| v.to_string()))
        })
}
