// src/blockchain/services/transfer.rs

use std::time::Duration;

use ethers_core::types::{Address, H256, U256};
use serde::Serialize;
use tracing::info;

use crate::blockchain::abi::{EventKind, EventRecord};
use crate::blockchain::builder::{GasParameters, OperationKind, TransactionIntent};
use crate::blockchain::client::MonadClient;
use crate::blockchain::error::ChainResult;
use crate::blockchain::events::result_event;
use crate::blockchain::rpc_pool::RpcTransport;
use crate::blockchain::units::{format_units_lossy, parse_address};

/// Summary of a confirmed transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResponse {
    pub hash: H256,
    pub from: Address,
    pub to: Address,
    pub amount: String,
    pub symbol: String,
    /// Token contract for token transfers.
    pub token: Option<Address>,
    pub block_number: Option<u64>,
    pub gas: GasParameters,
    pub gas_used: Option<U256>,
}

pub async fn send_mon<T: RpcTransport>(
    client: &MonadClient<T>,
    to: &str,
    amount: &str,
    timeout: Option<Duration>,
) -> ChainResult<TransferResponse> {
    let intent = TransactionIntent::new(OperationKind::NativeTransfer, to, amount);
    let (built, confirmed) = client.execute(&intent, client.wait_options(timeout)).await?;
    info!("Sent {} MON to {:?} in {:?}", built.display_amount(), built.to, confirmed.hash);
    Ok(TransferResponse {
        hash: confirmed.hash,
        from: built.from,
        to: built.to,
        amount: built.display_amount(),
        symbol: built.symbol.clone(),
        token: None,
        block_number: confirmed.block_number,
        gas: confirmed.gas,
        gas_used: confirmed.gas_used,
    })
}

/// ERC-20 transfer. The amount reported is the one in the emitted `Transfer`
/// event when the token emits one.
pub async fn send_token<T: RpcTransport>(
    client: &MonadClient<T>,
    token: &str,
    to: &str,
    amount: &str,
    timeout: Option<Duration>,
) -> ChainResult<TransferResponse> {
    let intent = TransactionIntent::new(
        OperationKind::TokenTransfer {
            token: token.to_string(),
        },
        to,
        amount,
    );
    let (built, confirmed) = client.execute(&intent, client.wait_options(timeout)).await?;

    // `built.to` is the token contract; the recipient travels in the calldata
    let recipient = parse_address(to)?;
    let (to, amount) = match result_event(&confirmed, EventKind::Transfer) {
        Some(event) => match event.record {
            EventRecord::Transfer(t) => (t.to, format_units_lossy(t.value, built.decimals)),
            _ => (recipient, built.display_amount()),
        },
        None => (recipient, built.display_amount()),
    };

    info!("Sent {} {} to {:?} in {:?}", amount, built.symbol, to, confirmed.hash);
    Ok(TransferResponse {
        hash: confirmed.hash,
        from: built.from,
        to,
        amount,
        symbol: built.symbol.clone(),
        token: Some(built.to),
        block_number: confirmed.block_number,
        gas: confirmed.gas,
        gas_used: confirmed.gas_used,
    })
}
