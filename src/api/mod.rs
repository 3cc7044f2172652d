//! # API Module
//!
//! HTTP surface of the Monad MCP server, mounted under `/api`.
//!
//! ## Available Endpoints
//!
//! - `GET /health` - Liveness plus the signer and RPC pool in use
//! - `GET /balance/:address` - Native MON balance
//! - `POST /rpc` - MCP JSON-RPC over HTTP

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::blockchain::error::ChainError;
use crate::AppState;

pub mod balance;
pub mod health;
pub mod rpc;

/// HTTP status for an engine failure.
pub fn status_for(err: &ChainError) -> StatusCode {
    match err {
        ChainError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ChainError::NotFound(_) => StatusCode::NOT_FOUND,
        ChainError::InsufficientFunds { .. } | ChainError::InsufficientLiquidity(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ChainError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ChainError::RpcUnavailable(_) | ChainError::NodeRejected { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Full application router with every route under `/api`.
pub fn router(state: AppState) -> Router {
    let api_router = Router::new()
        // Health check
        .route("/health", get(health::health_handler))
        // Blockchain data
        .route("/balance/:address", get(balance::get_balance_handler))
        // JSON-RPC endpoint for MCP tool calls
        .route("/rpc", post(rpc::rpc_handler));

    Router::new()
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
