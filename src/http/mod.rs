//! Control HTTP server.
//!
//! An Axum router exposing every command-table operation as
//! `GET|POST /:operation`, plus the operation listing, health and an SSE
//! notification stream.

mod routes;
mod sse;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::engine::BridgeHandle;

pub use routes::{build_router, HealthResponse, HttpServerError, HttpState, OperationList};
pub use sse::NotificationStream;

/// Serve the control plane on `addr` until `shutdown` resolves.
pub async fn serve(
    bridge: Arc<BridgeHandle>,
    addr: SocketAddr,
    token: Option<String>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = HttpState::new(bridge, token);
    routes::run_http_server(state, addr, shutdown).await
}
