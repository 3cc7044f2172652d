//! Shared fixtures: an in-process JSON-RPC node and helpers to script it.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers_core::abi::{encode, Token};
use ethers_core::types::{Address, H256, U256};
use ethers_signers::LocalWallet;
use serde_json::{json, Value};

use monad_mcp_server::blockchain::abi::{ContractCall, EventKind};
use monad_mcp_server::blockchain::models::ChainLog;
use monad_mcp_server::blockchain::rpc_pool::{RpcPool, RpcTransport, TransportError};
use monad_mcp_server::blockchain::{ClientSettings, MonadClient};

/// Anvil's first dev key; never funded outside local chains.
pub const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const MONAD_TESTNET_CHAIN_ID: u64 = 10143;

pub const ONE_MON: u128 = 1_000_000_000_000_000_000;

type Handler = dyn Fn(&str, &Value) -> Result<Value, TransportError> + Send + Sync;

/// Scripted JSON-RPC endpoint that records every method it is asked for.
#[derive(Clone)]
pub struct FakeTransport {
    url: String,
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeTransport {
    pub fn new<F>(url: &str, handler: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            url: url.to_string(),
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Endpoint whose every request fails at the HTTP level.
    pub fn down(url: &str) -> Self {
        Self::new(url, |_, _| Err(TransportError::Http("connection refused".into())))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| *m == method).count()
    }
}

#[async_trait]
impl RpcTransport for FakeTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(method.to_string());
        (self.handler)(method, &params)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

pub fn test_wallet() -> LocalWallet {
    TEST_KEY.parse().unwrap()
}

pub fn test_address() -> Address {
    TEST_ADDRESS.parse().unwrap()
}

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn fast_settings() -> ClientSettings {
    ClientSettings {
        receipt_poll_interval: Duration::from_millis(5),
        ..ClientSettings::default()
    }
}

/// Client over a single fake endpoint.
pub fn client_with(transport: FakeTransport, settings: ClientSettings) -> MonadClient<FakeTransport> {
    let pool = RpcPool::new(vec![transport], 1).unwrap();
    MonadClient::new(pool, test_wallet(), settings)
}

pub fn quantity(v: impl Into<U256>) -> Value {
    json!(format!("0x{:x}", v.into()))
}

pub fn mon(units: f64) -> U256 {
    U256::from((units * 1e6).round() as u128) * U256::from(1_000_000_000_000u64)
}

/// ABI-encoded single uint256, as `eth_call` returns it.
pub fn uint_word(v: impl Into<U256>) -> Value {
    json!(format!("0x{}", hex::encode(encode(&[Token::Uint(v.into())]))))
}

pub fn selector(call: &ContractCall) -> String {
    format!("0x{}", hex::encode(&call.calldata()[..4]))
}

/// Selector of the calldata in an `eth_call` / `eth_estimateGas` request.
pub fn call_selector(params: &Value) -> String {
    params[0]["data"]
        .as_str()
        .map(|d| d.chars().take(10).collect())
        .unwrap_or_default()
}

pub fn call_target(params: &Value) -> Address {
    params[0]["to"].as_str().unwrap().parse().unwrap()
}

pub fn topic_address(a: Address) -> H256 {
    H256::from(a)
}

pub fn topic_uint(v: u64) -> H256 {
    let mut buf = [0u8; 32];
    U256::from(v).to_big_endian(&mut buf);
    H256::from(buf)
}

pub fn log(address: Address, kind: EventKind, indexed: Vec<H256>, data: Vec<Token>) -> ChainLog {
    let mut topics = vec![kind.topic0()];
    topics.extend(indexed);
    ChainLog {
        address,
        topics,
        data: encode(&data).into(),
        block_number: None,
        transaction_hash: None,
    }
}

/// Log from an unrelated contract that matches none of the known schemas.
pub fn noise_log(address: Address) -> ChainLog {
    ChainLog {
        address,
        topics: vec![H256::repeat_byte(0x42), topic_uint(7)],
        data: vec![0u8; 32].into(),
        block_number: None,
        transaction_hash: None,
    }
}

pub fn with_position(mut log: ChainLog, block: u64, tx: H256) -> ChainLog {
    log.block_number = Some(block.into());
    log.transaction_hash = Some(tx);
    log
}

pub fn receipt_json(hash: &Value, status: Option<u64>, logs: &[ChainLog]) -> Value {
    let mut receipt = json!({
        "transactionHash": hash,
        "blockNumber": "0x10",
        "blockHash": format!("{:?}", H256::repeat_byte(0xbb)),
        "gasUsed": "0x5208",
        "logs": logs,
    });
    if let Some(s) = status {
        receipt["status"] = quantity(s);
    }
    receipt
}

/// Answers the methods every write path needs: nonce, chain id, gas price and
/// an `eth_sendRawTransaction` that echoes the transaction hash.
pub fn common_write_method(method: &str, params: &Value) -> Option<Result<Value, TransportError>> {
    let value = match method {
        "eth_chainId" => quantity(MONAD_TESTNET_CHAIN_ID),
        "eth_getTransactionCount" => quantity(3u64),
        "eth_gasPrice" => quantity(50_000_000_000u64),
        "eth_estimateGas" => quantity(50_000u64),
        "eth_sendRawTransaction" => {
            let raw = params[0].as_str().unwrap().trim_start_matches("0x");
            let bytes = hex::decode(raw).unwrap();
            json!(format!("{:?}", H256::from(ethers_core::utils::keccak256(bytes))))
        }
        _ => return None,
    };
    Some(Ok(value))
}
