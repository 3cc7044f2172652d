// src/blockchain/models.rs
use chrono::{DateTime, Utc};
use ethers_core::types::{Address, Bytes, H256, U256, U64};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// --- Chain data as returned by JSON-RPC ---

/// One entry of a receipt's log list, or of an `eth_getLogs` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_hash: Option<H256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReceiptStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub block_hash: Option<H256>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub logs: Vec<ChainLog>,
}

impl ChainReceipt {
    /// A receipt without a status field is not trusted as a success.
    pub fn status(&self) -> ReceiptStatus {
        match self.status {
            Some(s) if s == U64::one() => ReceiptStatus::Success,
            _ => ReceiptStatus::Failure,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
    pub hash: H256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    pub value: U256,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default)]
    pub nonce: U256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub block_hash: Option<H256>,
    #[serde(default)]
    pub gas: U256,
    #[serde(default)]
    pub gas_price: Option<U256>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    #[serde(default)]
    pub number: Option<U64>,
    #[serde(default)]
    pub hash: Option<H256>,
    pub parent_hash: H256,
    pub timestamp: U256,
    pub gas_used: U256,
    pub gas_limit: U256,
    /// Hashes, or full objects when requested with `true`.
    #[serde(default)]
    pub transactions: Vec<Value>,
}

impl BlockSummary {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.timestamp.low_u64() as i64, 0)
    }
}

/// Block selector for `eth_getBlockBy*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Latest,
    Number(u64),
    Hash(H256),
}

/// Filter for `eth_getLogs`. Topic positions left as `None` match anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub from_block: u64,
    pub to_block: u64,
    pub topics: Vec<Option<H256>>,
}

impl LogFilter {
    pub fn to_params(&self) -> Value {
        // trailing wildcards are dropped
        let mut topics = self.topics.clone();
        while matches!(topics.last(), Some(None)) {
            topics.pop();
        }
        json!([{
            "address": self.address,
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
            "topics": topics,
        }])
    }
}

// --- Token Models ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenMetadata {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Defines the structure for a balance response.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub address: Address,
    pub raw: U256,
    pub amount: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenBalance {
    pub token: TokenMetadata,
    pub raw: U256,
    pub amount: String,
}

// --- Transaction Detail Models ---

#[derive(Debug, Clone, Serialize)]
pub enum TransferKind {
    Native,
    Token,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    pub hash: H256,
    pub kind: TransferKind,
    pub from: Address,
    pub to: Option<Address>,
    pub amount: String,
    pub symbol: String,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub gas_used: Option<U256>,
}
