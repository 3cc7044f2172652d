// src/blockchain/rpc_pool.rs
//
// Several JSON-RPC endpoints behind one logical provider. Reads need `quorum`
// identical answers; writes need `quorum` acceptances. One ordered pass per call,
// no backoff.

use std::time::Duration;

use async_trait::async_trait;
use ethers_core::types::{Bytes, H256};
use ethers_core::utils::keccak256;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::blockchain::error::{ChainError, ChainResult};

/// Messages a node returns when it has already seen a raw transaction.
const DUPLICATE_SUBMISSION_MARKERS: [&str; 4] = [
    "already known",
    "known transaction",
    "already imported",
    "alreadyknown",
];

/// JSON-RPC codes that describe the endpoint's health rather than the request.
const ENDPOINT_FAULT_CODES: [i64; 5] = [-32005, -32603, -32601, -32002, -32004];

/// Message fragments of rate limiting and overload replies.
const ENDPOINT_FAULT_MARKERS: [&str; 5] = [
    "rate limit",
    "too many requests",
    "timeout",
    "timed out",
    "limit exceeded",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

/// One JSON-RPC endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    fn url(&self) -> &str;
}

/// JSON-RPC 2.0 over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpTransport {
    url: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(format!("status {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        if let Some(err) = body.get("error") {
            return Err(TransportError::Rpc {
                code: err["code"].as_i64().unwrap_or_default(),
                message: err["message"].as_str().unwrap_or("unknown error").to_string(),
            });
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| TransportError::Decode(format!("missing 'result' field: {}", body)))
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Outcome of one endpoint for quorum tallying. Node errors are answers too:
/// every honest node rejects a reverting `eth_estimateGas` the same way.
#[derive(Debug, Clone, PartialEq)]
enum Answer {
    Result(Value),
    NodeError { code: i64, message: String },
}

#[derive(Debug)]
pub struct RpcPool<T> {
    endpoints: Vec<T>,
    quorum: usize,
}

impl<T: RpcTransport> RpcPool<T> {
    pub fn new(endpoints: Vec<T>, quorum: usize) -> ChainResult<Self> {
        if endpoints.is_empty() {
            return Err(ChainError::invalid("at least one RPC endpoint is required"));
        }
        if quorum == 0 || quorum > endpoints.len() {
            return Err(ChainError::invalid(format!(
                "quorum must be between 1 and {}, got {}",
                endpoints.len(),
                quorum
            )));
        }
        Ok(Self { endpoints, quorum })
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn endpoint_urls(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.url()).collect()
    }

    /// Read-only call, deserialized into `R` once a quorum agrees.
    pub async fn read<R: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<R> {
        let value = self.read_value(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            ChainError::RpcUnavailable(format!("unexpected {} response shape: {}", method, e))
        })
    }

    pub async fn read_value(&self, method: &str, params: Value) -> ChainResult<Value> {
        let mut tally: Vec<(Answer, usize)> = Vec::new();
        let mut last_failure: Option<String> = None;

        for endpoint in &self.endpoints {
            let answer = match endpoint.request(method, params.clone()).await {
                Ok(v) => Answer::Result(v),
                Err(TransportError::Rpc { code, message }) if !is_endpoint_fault(code, &message) => {
                    Answer::NodeError { code, message }
                }
                Err(e) => {
                    warn!("{} failed on {}: {}", method, endpoint.url(), e);
                    last_failure = Some(format!("{}: {}", endpoint.url(), e));
                    continue;
                }
            };

            let count = match tally.iter_mut().find(|(a, _)| *a == answer) {
                Some((_, n)) => {
                    *n += 1;
                    *n
                }
                None => {
                    tally.push((answer.clone(), 1));
                    1
                }
            };

            if count >= self.quorum {
                debug!("{} reached quorum {} via {}", method, self.quorum, endpoint.url());
                return match answer {
                    Answer::Result(v) => Ok(v),
                    Answer::NodeError { code, message } => {
                        Err(ChainError::NodeRejected { code, message })
                    }
                };
            }
        }

        Err(ChainError::RpcUnavailable(format!(
            "{} could not reach quorum {} across {} endpoint(s){}",
            method,
            self.quorum,
            self.endpoints.len(),
            last_failure
                .map(|f| format!("; last failure: {}", f))
                .unwrap_or_default()
        )))
    }

    /// Broadcast a signed raw transaction. Duplicate-submission replies count as
    /// acceptances since the same bytes may reach several endpoints.
    pub async fn submit(&self, raw_tx: &Bytes) -> ChainResult<H256> {
        let local_hash = H256::from(keccak256(raw_tx.as_ref()));
        let params = json!([format!("0x{}", hex::encode(raw_tx.as_ref()))]);

        let mut accepted = 0usize;
        let mut first_rejection: Option<ChainError> = None;
        let mut last_failure: Option<String> = None;

        for endpoint in &self.endpoints {
            match endpoint.request("eth_sendRawTransaction", params.clone()).await {
                Ok(result) => {
                    if let Some(hash) = result.as_str() {
                        if !hash.eq_ignore_ascii_case(&format!("{:?}", local_hash)) {
                            warn!(
                                "{} returned hash {} for transaction {:?}",
                                endpoint.url(),
                                hash,
                                local_hash
                            );
                        }
                    }
                    accepted += 1;
                }
                Err(TransportError::Rpc { message, .. }) if is_duplicate_submission(&message) => {
                    debug!("{} already knows {:?}", endpoint.url(), local_hash);
                    accepted += 1;
                }
                Err(TransportError::Rpc { code, message }) if !is_endpoint_fault(code, &message) => {
                    warn!("{} rejected {:?}: {}", endpoint.url(), local_hash, message);
                    first_rejection.get_or_insert(ChainError::NodeRejected { code, message });
                }
                Err(e) => {
                    warn!("broadcast failed on {}: {}", endpoint.url(), e);
                    last_failure = Some(format!("{}: {}", endpoint.url(), e));
                }
            }

            if accepted >= self.quorum {
                info!("Broadcast {:?} accepted by {} endpoint(s)", local_hash, accepted);
                return Ok(local_hash);
            }
        }

        Err(first_rejection.unwrap_or_else(|| {
            ChainError::RpcUnavailable(format!(
                "broadcast accepted by {} of {} required endpoint(s){}",
                accepted,
                self.quorum,
                last_failure
                    .map(|f| format!("; last failure: {}", f))
                    .unwrap_or_default()
            ))
        }))
    }
}

fn is_duplicate_submission(message: &str) -> bool {
    let lower = message.to_lowercase();
    DUPLICATE_SUBMISSION_MARKERS.iter().any(|m| lower.contains(m))
}

/// Rate limits, overload and unsupported methods fall through to the next
/// endpoint like transport failures; execution rejections are answers.
fn is_endpoint_fault(code: i64, message: &str) -> bool {
    let lower = message.to_lowercase();
    ENDPOINT_FAULT_CODES.contains(&code) || ENDPOINT_FAULT_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_faults_are_told_apart_from_rejections() {
        assert!(is_endpoint_fault(-32005, "limit exceeded"));
        assert!(is_endpoint_fault(-32603, "internal error"));
        assert!(is_endpoint_fault(-32601, "the method eth_getLogs does not exist"));
        assert!(is_endpoint_fault(429, "Too Many Requests"));
        assert!(is_endpoint_fault(-32000, "request timed out"));
        assert!(!is_endpoint_fault(-32000, "execution reverted"));
        assert!(!is_endpoint_fault(3, "execution reverted: pool too small"));
        assert!(!is_endpoint_fault(-32000, "nonce too low"));
    }

    #[test]
    fn duplicate_markers_are_case_insensitive() {
        assert!(is_duplicate_submission("Already Known"));
        assert!(is_duplicate_submission("known transaction: 0xabc"));
        assert!(!is_duplicate_submission("nonce too low"));
        assert!(!is_duplicate_submission("insufficient funds for gas * price + value"));
    }
}
