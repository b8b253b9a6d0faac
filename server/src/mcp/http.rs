//! HTTP transport for the MCP server.
//!
//! Each `POST /mcp` carries one JSON-RPC message and gets the response in the
//! body. Notifications are acknowledged with `202 Accepted` and no body.

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use super::server::McpServer;

/// Build the axum router serving `server`
pub fn router(server: McpServer) -> Router {
    Router::new()
        .route("/mcp", post(handle_rpc))
        .route("/health", get(health_check))
        .route("/", get(root_handler))
        .with_state(server)
}

/// Listen on `addr` until `shutdown` resolves
pub async fn serve<F>(server: McpServer, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("MCP server listening on http://{}/mcp", listener.local_addr()?);

    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("MCP HTTP server shutting down");
    Ok(())
}

async fn handle_rpc(State(server): State<McpServer>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "agentmem",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "mcp": "/mcp",
            "health": "/health"
        }
    }))
}
