use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::api::status_for;
use crate::blockchain::services::balance::get_mon_balance;
use crate::AppState;

// Defines the structure for the JSON output returned by our API.
#[derive(Debug, Serialize)]
pub struct BalanceOutput {
    pub address: String,
    pub balance: String,
    pub raw: String,
    pub symbol: String,
}

// The handler function for the GET /balance/{address} endpoint.
pub async fn get_balance_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match get_mon_balance(state.client.as_ref(), &address).await {
        Ok(balance) => {
            let output = BalanceOutput {
                address: format!("{:?}", balance.address),
                balance: balance.amount,
                raw: balance.raw.to_string(),
                symbol: balance.symbol,
            };
            (StatusCode::OK, Json(output)).into_response()
        }
        Err(e) => {
            error!("Failed to get balance for {}: {}", address, e);
            (status_for(&e), format!("Failed to fetch balance: {}", e)).into_response()
        }
    }
}
