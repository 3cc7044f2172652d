// src/blockchain/services/chain.rs

use ethers_core::types::U256;
use serde::Serialize;
use tracing::{debug, info};

use crate::blockchain::abi::{EventKind, EventRecord};
use crate::blockchain::client::MonadClient;
use crate::blockchain::error::{ChainError, ChainResult};
use crate::blockchain::events::first_match;
use crate::blockchain::models::{
    BlockRef, BlockSummary, ReceiptStatus, TransactionDetails, TransferKind,
};
use crate::blockchain::rpc_pool::RpcTransport;
use crate::blockchain::units::{
    format_mon, format_units_lossy, parse_tx_hash, GWEI_DECIMALS, NATIVE_SYMBOL,
};

#[derive(Debug, Clone, Serialize)]
pub struct GasPriceResponse {
    pub wei: U256,
    pub gwei: String,
}

pub async fn get_gas_price<T: RpcTransport>(client: &MonadClient<T>) -> ChainResult<GasPriceResponse> {
    let wei = client.reader().gas_price().await?;
    Ok(GasPriceResponse {
        wei,
        gwei: format_units_lossy(wei, GWEI_DECIMALS),
    })
}

pub async fn get_latest_block<T: RpcTransport>(client: &MonadClient<T>) -> ChainResult<BlockSummary> {
    client.reader().block(BlockRef::Latest).await
}

/// Transaction, receipt and block time. A successful receipt carrying an ERC-20
/// `Transfer` is reported as a token transfer; a failed receipt is never decoded.
pub async fn get_transaction_details<T: RpcTransport>(
    client: &MonadClient<T>,
    hash: &str,
) -> ChainResult<TransactionDetails> {
    let hash = parse_tx_hash(hash)?;
    let reader = client.reader();

    let (tx, receipt) = tokio::try_join!(reader.transaction(hash), reader.receipt(hash))?;
    let receipt = receipt
        .ok_or_else(|| ChainError::NotFound(format!("receipt for {:?} (transaction pending)", hash)))?;

    let block_ref = match (receipt.block_hash, receipt.block_number) {
        (Some(h), _) => Some(BlockRef::Hash(h)),
        (None, Some(n)) => Some(BlockRef::Number(n.as_u64())),
        (None, None) => None,
    };
    let timestamp = match block_ref {
        Some(b) => reader.block(b).await?.datetime(),
        None => None,
    };

    let status = receipt.status();
    let mut details = TransactionDetails {
        hash,
        kind: TransferKind::Native,
        from: tx.from,
        to: tx.to,
        amount: format_mon(tx.value),
        symbol: NATIVE_SYMBOL.to_string(),
        status,
        block_number: receipt.block_number.map(|n| n.as_u64()),
        timestamp,
        gas_used: receipt.gas_used,
    };

    if status == ReceiptStatus::Success {
        if let Some(event) = first_match(&receipt.logs, EventKind::Transfer) {
            if let EventRecord::Transfer(transfer) = &event.record {
                let meta = reader.token_metadata(event.contract).await?;
                debug!("{:?} carries a {} transfer", hash, meta.symbol);
                details.kind = TransferKind::Token;
                details.from = transfer.from;
                details.to = Some(transfer.to);
                details.amount = format_units_lossy(transfer.value, meta.decimals);
                details.symbol = meta.symbol;
            }
        }
    }

    info!("Fetched details for {:?} ({:?})", hash, details.kind);
    Ok(details)
}
