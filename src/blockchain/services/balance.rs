// src/blockchain/services/balance.rs

use futures::future::try_join_all;
use tracing::info;

use crate::blockchain::client::MonadClient;
use crate::blockchain::error::ChainResult;
use crate::blockchain::models::{BalanceResponse, TokenBalance};
use crate::blockchain::rpc_pool::RpcTransport;
use crate::blockchain::units::{format_mon, format_units_lossy, parse_address, NATIVE_SYMBOL};

pub async fn get_mon_balance<T: RpcTransport>(
    client: &MonadClient<T>,
    address: &str,
) -> ChainResult<BalanceResponse> {
    let address = parse_address(address)?;
    let raw = client.reader().native_balance(address).await?;
    info!("MON balance of {:?}: {}", address, raw);
    Ok(BalanceResponse {
        address,
        raw,
        amount: format_mon(raw),
        symbol: NATIVE_SYMBOL.to_string(),
    })
}

/// Balance, symbol and decimals of one token, read concurrently.
pub async fn get_token_balance<T: RpcTransport>(
    client: &MonadClient<T>,
    token: &str,
    holder: &str,
) -> ChainResult<TokenBalance> {
    let token = parse_address(token)?;
    let holder = parse_address(holder)?;
    let reader = client.reader();
    let (raw, metadata) = tokio::try_join!(
        reader.token_balance(token, holder),
        reader.token_metadata(token)
    )?;
    Ok(TokenBalance {
        amount: format_units_lossy(raw, metadata.decimals),
        token: metadata,
        raw,
    })
}

/// All token balances of `holder`, fetched concurrently and joined in input
/// order. One failing token fails the whole query.
pub async fn get_multiple_balances<T: RpcTransport>(
    client: &MonadClient<T>,
    holder: &str,
    tokens: &[String],
) -> ChainResult<Vec<TokenBalance>> {
    // validate everything before the first request goes out
    parse_address(holder)?;
    for token in tokens {
        parse_address(token)?;
    }
    try_join_all(tokens.iter().map(|token| get_token_balance(client, token, holder))).await
}
