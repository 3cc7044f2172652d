//! Real HTTP round trips: `HttpTransport` against a mock JSON-RPC node, and the
//! axum router on top of a client wired to it.

mod common;

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use ethers_core::types::U64;
use mockito::{mock, Matcher};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{fast_settings, mon, test_wallet, TEST_ADDRESS};
use monad_mcp_server::api;
use monad_mcp_server::blockchain::error::ChainError;
use monad_mcp_server::blockchain::{HttpTransport, MonadClient, RpcPool};
use monad_mcp_server::AppState;

/// Single-endpoint pool whose node lives at `path` on the mock server.
fn pool_at(path: &str) -> RpcPool<HttpTransport> {
    let url = format!("{}{}", mockito::server_url(), path);
    let transport = HttpTransport::new(&url, Duration::from_secs(5)).unwrap();
    RpcPool::new(vec![transport], 1).unwrap()
}

fn rpc_body(method: &str) -> Matcher {
    Matcher::PartialJson(json!({ "jsonrpc": "2.0", "method": method }))
}

#[tokio::test]
async fn transport_reads_results() {
    let _m = mock("POST", "/read")
        .match_body(rpc_body("eth_blockNumber"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x1a"}"#)
        .create();

    let n: U64 = pool_at("/read").read("eth_blockNumber", json!([])).await.unwrap();
    assert_eq!(n.as_u64(), 26);
}

#[tokio::test]
async fn node_error_objects_are_rejections() {
    let _m = mock("POST", "/reject")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"execution reverted"}}"#)
        .create();

    let err = pool_at("/reject")
        .read::<U64>("eth_estimateGas", json!([{}]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ChainError::NodeRejected {
            code: -32000,
            message: "execution reverted".into()
        }
    );
}

#[tokio::test]
async fn http_failures_leave_the_pool_unavailable() {
    let _m = mock("POST", "/down").with_status(503).create();

    let err = pool_at("/down")
        .read::<U64>("eth_blockNumber", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::RpcUnavailable(_)), "{:?}", err);
}

fn app_at(path: &str) -> axum::Router {
    let client = MonadClient::new(pool_at(path), test_wallet(), fast_settings());
    api::router(AppState::new(client))
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn balance_endpoint_reads_through_the_pool() {
    let _m = mock("POST", "/balance")
        .match_body(rpc_body("eth_getBalance"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": format!("0x{:x}", mon(1.5)) }).to_string())
        .create();

    let resp = app_at("/balance")
        .oneshot(
            Request::builder()
                .uri(format!("/api/balance/{}", TEST_ADDRESS))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["balance"], json!("1.5"));
    assert_eq!(body["symbol"], json!("MON"));
    assert_eq!(body["raw"], json!("1500000000000000000"));
}

#[tokio::test]
async fn malformed_address_is_a_bad_request() {
    let resp = app_at("/unused")
        .oneshot(
            Request::builder()
                .uri("/api/balance/0x1234")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rpc_endpoint_serves_mcp() {
    let _m = mock("POST", "/mcp")
        .match_body(rpc_body("eth_gasPrice"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0xba43b7400"}"#)
        .create();

    let call = json!({
        "jsonrpc": "2.0",
        "id": 9,
        "method": "tools/call",
        "params": { "name": "get-gas-price", "arguments": {} }
    });
    let resp = app_at("/mcp")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/rpc")
                .header("content-type", "application/json")
                .body(Body::from(call.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["id"], json!(9));
    assert_eq!(
        body["result"]["content"][0]["text"],
        json!("Current Gas Price: 50 Gwei")
    );
}

#[tokio::test]
async fn health_reports_the_signer_and_pool() {
    let resp = app_at("/unused")
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["wallet"], json!(TEST_ADDRESS));
    assert_eq!(body["quorum"], json!(1));
    assert_eq!(body["log_scan_window"], json!(1000));
}
