use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.client.reader().pool();
    Json(json!({
        "status": "ok",
        "wallet": state.client.wallet_address(),
        "rpc_endpoints": pool.endpoint_urls().len(),
        "quorum": pool.quorum(),
        "log_scan_window": state.client.scanner().window()
    }))
}
