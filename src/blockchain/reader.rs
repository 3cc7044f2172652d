// src/blockchain/reader.rs
//
// Side-effect-free chain queries routed through the RPC pool. Every method is
// independent, so callers are free to join several of them concurrently.

use std::sync::Arc;

use ethers_core::types::{Address, Bytes, H256, U256, U64};
use serde_json::{json, Value};
use tracing::debug;

use crate::blockchain::abi::{decode_symbol, ContractCall};
use crate::blockchain::error::{ChainError, ChainResult};
use crate::blockchain::models::{
    BlockRef, BlockSummary, ChainLog, ChainReceipt, ChainTransaction, LogFilter, TokenMetadata,
};
use crate::blockchain::rpc_pool::{RpcPool, RpcTransport};
use crate::blockchain::units::{MAX_DECIMALS, NATIVE_DECIMALS};

/// Symbol shown for tokens whose `symbol()` cannot be read.
pub const UNKNOWN_SYMBOL: &str = "???";

/// Fields of an `eth_call` / `eth_estimateGas` call object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub value: U256,
    pub data: Option<Bytes>,
}

impl CallRequest {
    fn to_json(&self) -> Value {
        let mut obj = json!({ "to": self.to });
        if let Some(from) = self.from {
            obj["from"] = json!(from);
        }
        if !self.value.is_zero() {
            obj["value"] = json!(self.value);
        }
        if let Some(data) = &self.data {
            obj["data"] = json!(data);
        }
        obj
    }
}

pub struct ChainReader<T> {
    pool: Arc<RpcPool<T>>,
}

impl<T> Clone for ChainReader<T> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<T: RpcTransport> ChainReader<T> {
    pub fn new(pool: Arc<RpcPool<T>>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<RpcPool<T>> {
        &self.pool
    }

    pub async fn chain_id(&self) -> ChainResult<u64> {
        let id: U64 = self.pool.read("eth_chainId", json!([])).await?;
        Ok(id.as_u64())
    }

    pub async fn block_number(&self) -> ChainResult<u64> {
        let n: U64 = self.pool.read("eth_blockNumber", json!([])).await?;
        Ok(n.as_u64())
    }

    /// Native balance in wei.
    pub async fn native_balance(&self, address: Address) -> ChainResult<U256> {
        self.pool
            .read("eth_getBalance", json!([address, "latest"]))
            .await
    }

    /// Nonce for the next transaction, counting pending ones.
    pub async fn transaction_count(&self, address: Address) -> ChainResult<U256> {
        self.pool
            .read("eth_getTransactionCount", json!([address, "pending"]))
            .await
    }

    pub async fn gas_price(&self) -> ChainResult<U256> {
        self.pool.read("eth_gasPrice", json!([])).await
    }

    pub async fn estimate_gas(&self, call: &CallRequest) -> ChainResult<U256> {
        self.pool
            .read("eth_estimateGas", json!([call.to_json()]))
            .await
    }

    pub async fn transaction(&self, hash: H256) -> ChainResult<ChainTransaction> {
        let tx: Option<ChainTransaction> = self
            .pool
            .read("eth_getTransactionByHash", json!([hash]))
            .await?;
        tx.ok_or_else(|| ChainError::NotFound(format!("transaction {:?}", hash)))
    }

    /// `None` while the transaction is not yet mined.
    pub async fn receipt(&self, hash: H256) -> ChainResult<Option<ChainReceipt>> {
        self.pool
            .read("eth_getTransactionReceipt", json!([hash]))
            .await
    }

    pub async fn block(&self, block: BlockRef) -> ChainResult<BlockSummary> {
        let found: Option<BlockSummary> = match block {
            BlockRef::Latest => {
                self.pool
                    .read("eth_getBlockByNumber", json!(["latest", false]))
                    .await?
            }
            BlockRef::Number(n) => {
                self.pool
                    .read("eth_getBlockByNumber", json!([format!("0x{:x}", n), false]))
                    .await?
            }
            BlockRef::Hash(h) => {
                self.pool
                    .read("eth_getBlockByHash", json!([h, false]))
                    .await?
            }
        };
        found.ok_or_else(|| ChainError::NotFound(format!("block {:?}", block)))
    }

    pub async fn logs(&self, filter: &LogFilter) -> ChainResult<Vec<ChainLog>> {
        let logs: Vec<ChainLog> = self.pool.read("eth_getLogs", filter.to_params()).await?;
        debug!(
            "eth_getLogs {:?} [{}..{}] returned {} log(s)",
            filter.address,
            filter.from_block,
            filter.to_block,
            logs.len()
        );
        Ok(logs)
    }

    /// Raw `eth_call` against the latest block.
    pub async fn call_raw(&self, to: Address, data: Bytes) -> ChainResult<Bytes> {
        let call = CallRequest {
            from: None,
            to,
            value: U256::zero(),
            data: Some(data),
        };
        self.pool
            .read("eth_call", json!([call.to_json(), "latest"]))
            .await
    }

    /// Read-only contract call returning a single uint256.
    pub async fn call_uint(&self, contract: Address, call: ContractCall) -> ChainResult<U256> {
        let out = self.call_raw(contract, call.calldata()).await?;
        call.decode_uint(out.as_ref())
    }

    pub async fn token_balance(&self, token: Address, holder: Address) -> ChainResult<U256> {
        self.call_uint(token, ContractCall::BalanceOf { account: holder })
            .await
    }

    /// Token decimals; 18 when the contract does not expose `decimals()`.
    pub async fn token_decimals(&self, token: Address) -> ChainResult<u8> {
        let call = ContractCall::Decimals;
        let decimals = match self.call_raw(token, call.calldata()).await {
            Ok(out) if !out.is_empty() => call
                .decode_uint(out.as_ref())
                .map(|d| d.low_u32().min(u8::MAX as u32) as u8)
                .unwrap_or(NATIVE_DECIMALS),
            Ok(_) | Err(ChainError::NodeRejected { .. }) => NATIVE_DECIMALS,
            Err(e) => return Err(e),
        };
        if decimals > MAX_DECIMALS {
            return Err(ChainError::invalid(format!(
                "token {:?} reports {} decimals",
                token, decimals
            )));
        }
        Ok(decimals)
    }

    pub async fn token_symbol(&self, token: Address) -> ChainResult<String> {
        match self.call_raw(token, ContractCall::Symbol.calldata()).await {
            Ok(out) => Ok(decode_symbol(out.as_ref()).unwrap_or_else(|| UNKNOWN_SYMBOL.to_string())),
            Err(ChainError::NodeRejected { .. }) => Ok(UNKNOWN_SYMBOL.to_string()),
            Err(e) => Err(e),
        }
    }

    /// Symbol and decimals, read concurrently.
    pub async fn token_metadata(&self, token: Address) -> ChainResult<TokenMetadata> {
        let (symbol, decimals) =
            tokio::try_join!(self.token_symbol(token), self.token_decimals(token))?;
        Ok(TokenMetadata {
            address: token,
            symbol,
            decimals,
        })
    }
}
