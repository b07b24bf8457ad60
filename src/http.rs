//! JSON-RPC over HTTP.
//!
//! `POST /mcp` takes one JSON-RPC message per request. Requests are answered
//! with the response body; notifications get `202 Accepted` and no body.
//! `GET /health` is a liveness probe for hosted deployments.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::server::{McpServer, SERVER_VERSION};

/// Build the HTTP router for a server.
pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_rpc))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(server)
}

/// Serve until the listener fails.
pub async fn serve(server: Arc<McpServer>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("MCP server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(server)).await?;
    Ok(())
}

async fn handle_rpc(State(server): State<Arc<McpServer>>, body: String) -> Response {
    tracing::debug!("Received: {}", body);
    match server.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health(State(server): State<Arc<McpServer>>) -> impl IntoResponse {
    let settings = &server.tools().context().settings;
    Json(json!({
        "status": "healthy",
        "service": settings.server_name,
        "version": SERVER_VERSION,
        "deployment": settings.deployment,
    }))
}
