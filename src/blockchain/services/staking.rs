// src/blockchain/services/staking.rs
//
// aprMON liquid staking vault: deposit, two-phase redemption and position reads.
// Redeem requests are never stored locally; their state is always re-read from
// the vault.

use std::time::Duration;

use ethers_core::types::{Address, H256, U256};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::blockchain::abi::{address_topic, ContractCall, EventKind, EventRecord};
use crate::blockchain::builder::{GasParameters, OperationKind, TransactionIntent};
use crate::blockchain::client::MonadClient;
use crate::blockchain::error::{ChainError, ChainResult};
use crate::blockchain::events::result_event;
use crate::blockchain::rpc_pool::RpcTransport;
use crate::blockchain::scanner::LogQuery;
use crate::blockchain::units::{format_mon, format_units_lossy, parse_address};

/// Basis points to percent: 10_000 bps is 100.00%.
const BASIS_POINT_DECIMALS: u8 = 2;

#[derive(Debug, Clone, Serialize)]
pub struct DepositResponse {
    pub hash: H256,
    pub assets: String,
    /// Shares minted, from the `Deposit` event.
    pub shares: Option<String>,
    pub block_number: Option<u64>,
    pub gas: GasParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedeemRequestResponse {
    pub hash: H256,
    pub shares: String,
    /// Id to pass to the claim, from the `RedeemRequest` event.
    pub request_id: Option<U256>,
    pub assets: Option<String>,
    pub block_number: Option<u64>,
    pub gas: GasParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimResponse {
    pub hash: H256,
    pub request_id: U256,
    pub pending_shares: String,
    pub assets: Option<String>,
    pub fee: Option<String>,
    pub block_number: Option<u64>,
    pub gas: GasParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultPosition {
    pub owner: Address,
    pub shares: String,
    pub assets: String,
    /// Fee in basis points of the redeemed assets.
    pub withdrawal_fee: U256,
    /// The same fee as a percentage.
    pub withdrawal_fee_percent: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedeemRequestStatus {
    pub request_id: U256,
    pub transaction_hash: Option<H256>,
    pub block_number: Option<u64>,
    /// Shares named in the request log.
    pub requested_shares: String,
    /// Shares the vault still holds for the request.
    pub pending_shares: String,
    pub pending: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRedeems {
    pub controller: Address,
    pub from_block: u64,
    pub to_block: u64,
    pub requests: Vec<RedeemRequestStatus>,
}

/// Parses a decimal request id.
pub fn parse_request_id(input: &str) -> ChainResult<U256> {
    let input = input.trim();
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ChainError::invalid(format!(
            "request id '{}' must be a non-negative integer",
            input
        )));
    }
    U256::from_dec_str(input)
        .map_err(|_| ChainError::invalid(format!("request id '{}' is too large", input)))
}

fn owner_or_wallet<T: RpcTransport>(client: &MonadClient<T>, owner: Option<&str>) -> ChainResult<Address> {
    match owner {
        Some(o) => parse_address(o),
        None => Ok(client.wallet_address()),
    }
}

/// Deposits `amount` MON for aprMON shares.
pub async fn deposit<T: RpcTransport>(
    client: &MonadClient<T>,
    amount: &str,
    timeout: Option<Duration>,
) -> ChainResult<DepositResponse> {
    let vault = client.aprmon_contract()?;
    let intent = TransactionIntent::new(OperationKind::VaultDeposit, format!("{:?}", vault), amount);
    let (built, confirmed) = client.execute(&intent, client.wait_options(timeout)).await?;

    let shares = result_event(&confirmed, EventKind::Deposit).and_then(|event| match event.record {
        EventRecord::Deposit(d) => Some(format_mon(d.shares)),
        _ => None,
    });
    info!("Deposited {} MON into {:?}, shares {:?}", built.display_amount(), vault, shares);

    Ok(DepositResponse {
        hash: confirmed.hash,
        assets: built.display_amount(),
        shares,
        block_number: confirmed.block_number,
        gas: confirmed.gas,
    })
}

/// Starts a redemption of `shares` aprMON. The builder checks the share balance.
pub async fn request_redeem<T: RpcTransport>(
    client: &MonadClient<T>,
    shares: &str,
    timeout: Option<Duration>,
) -> ChainResult<RedeemRequestResponse> {
    let vault = client.aprmon_contract()?;
    let intent = TransactionIntent::new(OperationKind::VaultRequestRedeem, format!("{:?}", vault), shares);
    let (built, confirmed) = client.execute(&intent, client.wait_options(timeout)).await?;

    let request = result_event(&confirmed, EventKind::RedeemRequest).and_then(|event| match event.record {
        EventRecord::RedeemRequest(r) => Some(r),
        _ => None,
    });
    match &request {
        Some(r) => info!("Redeem request {} created in {:?}", r.request_id, confirmed.hash),
        None => warn!("{:?} confirmed without a RedeemRequest event", confirmed.hash),
    }

    Ok(RedeemRequestResponse {
        hash: confirmed.hash,
        shares: built.display_amount(),
        request_id: request.as_ref().map(|r| r.request_id),
        assets: request.as_ref().map(|r| format_mon(r.assets)),
        block_number: confirmed.block_number,
        gas: confirmed.gas,
    })
}

/// Claims a matured request. A request with nothing pending is reported as
/// `NotFound` and nothing is broadcast.
pub async fn claim_redeem<T: RpcTransport>(
    client: &MonadClient<T>,
    request_id: &str,
    timeout: Option<Duration>,
) -> ChainResult<ClaimResponse> {
    let vault = client.aprmon_contract()?;
    let request_id = parse_request_id(request_id)?;
    let controller = client.wallet_address();

    let pending = client
        .reader()
        .call_uint(vault, ContractCall::PendingRedeemRequest { request_id, controller })
        .await?;
    if pending.is_zero() {
        return Err(ChainError::NotFound(format!(
            "redeem request {} has nothing pending for {:?} (already claimed or never created)",
            request_id, controller
        )));
    }

    let intent = TransactionIntent::new(
        OperationKind::VaultRedeem { request_id },
        format!("{:?}", vault),
        "0",
    );
    let (_, confirmed) = client.execute(&intent, client.wait_options(timeout)).await?;

    let redeem = result_event(&confirmed, EventKind::Redeem).and_then(|event| match event.record {
        EventRecord::Redeem(r) => Some(r),
        _ => None,
    });
    info!("Claimed redeem request {} in {:?}", request_id, confirmed.hash);

    Ok(ClaimResponse {
        hash: confirmed.hash,
        request_id,
        pending_shares: format_mon(pending),
        assets: redeem.as_ref().map(|r| format_mon(r.assets)),
        fee: redeem.as_ref().map(|r| format_mon(r.fee)),
        block_number: confirmed.block_number,
        gas: confirmed.gas,
    })
}

/// Share balance, its asset value and the vault's withdrawal fee.
pub async fn get_position<T: RpcTransport>(
    client: &MonadClient<T>,
    owner: Option<&str>,
) -> ChainResult<VaultPosition> {
    let vault = client.aprmon_contract()?;
    let owner = owner_or_wallet(client, owner)?;
    let reader = client.reader();

    let (shares, withdrawal_fee) = tokio::try_join!(
        reader.token_balance(vault, owner),
        reader.call_uint(vault, ContractCall::WithdrawalFee)
    )?;
    let assets = reader
        .call_uint(vault, ContractCall::ConvertToAssets { shares })
        .await?;

    Ok(VaultPosition {
        owner,
        shares: format_mon(shares),
        assets: format_mon(assets),
        withdrawal_fee,
        withdrawal_fee_percent: format_units_lossy(withdrawal_fee, BASIS_POINT_DECIMALS),
    })
}

/// Redeem requests created in the scan window, each re-checked against the vault.
pub async fn get_pending_redeems<T: RpcTransport>(
    client: &MonadClient<T>,
    controller: Option<&str>,
    limit: usize,
) -> ChainResult<PendingRedeems> {
    let vault = client.aprmon_contract()?;
    let controller = owner_or_wallet(client, controller)?;

    let query = LogQuery::new(vault, EventKind::RedeemRequest, limit)
        .with_indexed(0, address_topic(controller));
    let scan = client.scanner().scan(&query).await?;

    let requests: Vec<_> = scan
        .events
        .into_iter()
        .filter_map(|event| match event.record {
            EventRecord::RedeemRequest(r) => Some((event.transaction_hash, event.block_number, r)),
            _ => None,
        })
        .collect();

    // a log proves creation only; the vault says whether it is still open
    let reader = client.reader();
    let pending = try_join_all(requests.iter().map(|(_, _, r)| {
        reader.call_uint(
            vault,
            ContractCall::PendingRedeemRequest {
                request_id: r.request_id,
                controller,
            },
        )
    }))
    .await?;

    let requests = requests
        .into_iter()
        .zip(pending)
        .map(|((transaction_hash, block_number, r), pending)| RedeemRequestStatus {
            request_id: r.request_id,
            transaction_hash,
            block_number,
            requested_shares: format_mon(r.shares),
            pending_shares: format_mon(pending),
            pending: !pending.is_zero(),
        })
        .collect();

    Ok(PendingRedeems {
        controller,
        from_block: scan.from_block,
        to_block: scan.to_block,
        requests,
    })
}
