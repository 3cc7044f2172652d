// src/blockchain/error.rs

use ethers_core::types::H256;
use thiserror::Error;

/// Failures surfaced by the transaction engine. Every variant is returned to the
/// tool layer as a value; nothing here terminates the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Malformed address, amount or enum value. Raised before any network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("insufficient funds: need {required} {unit}, have {available} {unit}")]
    InsufficientFunds {
        required: String,
        available: String,
        unit: String,
    },

    /// A contract-side precondition fails, e.g. a payout pool too small for the bet.
    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// No configured endpoint could satisfy the quorum.
    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),

    /// A quorum of endpoints answered with the same JSON-RPC error object.
    #[error("node rejected request (code {code}): {message}")]
    NodeRejected { code: i64, message: String },

    #[error("transaction {hash:?} reverted")]
    TransactionReverted { hash: H256 },

    /// A log did not match the expected event schema. Recovered locally by the
    /// decoder and the scanner.
    #[error("log does not match {0}")]
    DecodeMismatch(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transaction {hash:?} not confirmed within {secs}s")]
    Timeout { hash: H256, secs: u64 },

    #[error("confirmation wait for {hash:?} was cancelled")]
    Cancelled { hash: H256 },

    #[error("signing failed: {0}")]
    Signing(String),
}

impl ChainError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ChainError::InvalidArgument(msg.into())
    }

    /// Short machine-friendly name of the error kind, used in structured tool output.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::InvalidArgument(_) => "InvalidArgument",
            ChainError::InsufficientFunds { .. } => "InsufficientFunds",
            ChainError::InsufficientLiquidity(_) => "InsufficientLiquidity",
            ChainError::RpcUnavailable(_) => "RpcUnavailable",
            ChainError::NodeRejected { .. } => "NodeRejected",
            ChainError::TransactionReverted { .. } => "TransactionReverted",
            ChainError::DecodeMismatch(_) => "DecodeMismatch",
            ChainError::NotFound(_) => "NotFound",
            ChainError::Timeout { .. } => "Timeout",
            ChainError::Cancelled { .. } => "Cancelled",
            ChainError::Signing(_) => "Signing",
        }
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
