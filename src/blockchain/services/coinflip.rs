// src/blockchain/services/coinflip.rs
//
// Coinflip wager game: play a round, read the payout pool, and rebuild a
// player's recent history from `FlipResult` logs.

use std::time::Duration;

use ethers_core::types::{Address, H256, U256};
use serde::Serialize;
use tracing::{info, warn};

use crate::blockchain::abi::{address_topic, CoinSide, ContractCall, EventKind, EventRecord};
use crate::blockchain::builder::{GasParameters, OperationKind, TransactionIntent};
use crate::blockchain::client::MonadClient;
use crate::blockchain::error::{ChainError, ChainResult};
use crate::blockchain::events::result_event;
use crate::blockchain::rpc_pool::RpcTransport;
use crate::blockchain::scanner::LogQuery;
use crate::blockchain::units::{format_mon, parse_address, to_raw_units, NATIVE_DECIMALS};

/// Payout pool must cover this multiple of the bet.
pub const POOL_COVERAGE_MULTIPLIER: u64 = 2;

#[derive(Debug, Clone, Serialize)]
pub struct FlipSummary {
    pub outcome: CoinSide,
    pub won: bool,
    /// Payout in MON, zero on a loss.
    pub payout: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlipPlayResponse {
    pub hash: H256,
    pub player: Address,
    pub choice: CoinSide,
    pub bet: String,
    /// `None` when the receipt carried no decodable `FlipResult`.
    pub result: Option<FlipSummary>,
    pub block_number: Option<u64>,
    pub gas: GasParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolBalance {
    pub contract: Address,
    pub raw: U256,
    pub amount: String,
}

/// One decoded round.
#[derive(Debug, Clone, Serialize)]
pub struct FlipGame {
    pub transaction_hash: Option<H256>,
    pub block_number: Option<u64>,
    pub choice: CoinSide,
    pub outcome: CoinSide,
    pub won: bool,
    pub bet: U256,
    pub payout: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlipStats {
    pub games: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_wagered: U256,
    pub total_payout: U256,
}

impl FlipStats {
    pub fn from_games(games: &[FlipGame]) -> Self {
        games.iter().fold(Self::default(), |mut stats, game| {
            stats.games += 1;
            stats.total_wagered = stats.total_wagered.saturating_add(game.bet);
            if game.won {
                stats.wins += 1;
                stats.total_payout = stats.total_payout.saturating_add(game.payout);
            } else {
                stats.losses += 1;
            }
            stats
        })
    }

    /// Payout minus wagered, as a signed MON string.
    pub fn net_display(&self) -> String {
        if self.total_payout >= self.total_wagered {
            format!("+{}", format_mon(self.total_payout - self.total_wagered))
        } else {
            format!("-{}", format_mon(self.total_wagered - self.total_payout))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlipHistory {
    pub player: Address,
    pub from_block: u64,
    pub to_block: u64,
    /// Newest first.
    pub games: Vec<FlipGame>,
    pub stats: FlipStats,
    pub net: String,
}

pub async fn get_pool_balance<T: RpcTransport>(client: &MonadClient<T>) -> ChainResult<PoolBalance> {
    let contract = client.coinflip_contract()?;
    let raw = client
        .reader()
        .call_uint(contract, ContractCall::GetTotalBalance)
        .await?;
    Ok(PoolBalance {
        contract,
        raw,
        amount: format_mon(raw),
    })
}

/// Wagers `amount` MON on `choice`. The pool is checked before anything is built.
pub async fn play<T: RpcTransport>(
    client: &MonadClient<T>,
    choice: &str,
    amount: &str,
    timeout: Option<Duration>,
) -> ChainResult<FlipPlayResponse> {
    let contract = client.coinflip_contract()?;
    let choice = CoinSide::parse(choice)?;
    let bet = to_raw_units(amount, NATIVE_DECIMALS)?;
    if bet.is_zero() {
        return Err(ChainError::invalid("bet must be greater than zero"));
    }

    let pool = client
        .reader()
        .call_uint(contract, ContractCall::GetTotalBalance)
        .await?;
    let required = bet.saturating_mul(U256::from(POOL_COVERAGE_MULTIPLIER));
    if pool < required {
        warn!("Coinflip pool {} cannot cover bet {}", pool, bet);
        return Err(ChainError::InsufficientLiquidity(format!(
            "pool holds {} MON, a {} MON bet needs at least {} MON",
            format_mon(pool),
            format_mon(bet),
            format_mon(required)
        )));
    }

    let intent = TransactionIntent::new(
        OperationKind::FlipCoin { choice },
        format!("{:?}", contract),
        amount,
    );
    let (built, confirmed) = client.execute(&intent, client.wait_options(timeout)).await?;

    let result = result_event(&confirmed, EventKind::FlipResult).and_then(|event| match event.record {
        EventRecord::FlipResult(flip) => Some(FlipSummary {
            outcome: flip.outcome(),
            won: flip.won,
            payout: if flip.won { format_mon(flip.amount) } else { "0".to_string() },
        }),
        _ => None,
    });

    match &result {
        Some(r) => info!("Coinflip {:?}: {} ({})", confirmed.hash, r.outcome.label(), if r.won { "won" } else { "lost" }),
        None => warn!("Coinflip {:?} confirmed without a FlipResult event", confirmed.hash),
    }

    Ok(FlipPlayResponse {
        hash: confirmed.hash,
        player: built.from,
        choice,
        bet: built.display_amount(),
        result,
        block_number: confirmed.block_number,
        gas: confirmed.gas,
    })
}

/// Recent rounds of `player` (the server wallet when `None`) within the scan
/// window. Stats cover exactly the returned rounds.
pub async fn get_history<T: RpcTransport>(
    client: &MonadClient<T>,
    player: Option<&str>,
    limit: usize,
) -> ChainResult<FlipHistory> {
    let contract = client.coinflip_contract()?;
    let player = match player {
        Some(p) => parse_address(p)?,
        None => client.wallet_address(),
    };

    let query = LogQuery::new(contract, EventKind::FlipResult, limit).with_indexed(0, address_topic(player));
    let scan = client.scanner().scan(&query).await?;

    let games: Vec<FlipGame> = scan
        .events
        .into_iter()
        .filter_map(|event| match event.record {
            EventRecord::FlipResult(flip) => Some(FlipGame {
                transaction_hash: event.transaction_hash,
                block_number: event.block_number,
                choice: flip.choice,
                outcome: flip.outcome(),
                won: flip.won,
                bet: flip.bet,
                payout: if flip.won { flip.amount } else { U256::zero() },
            }),
            _ => None,
        })
        .collect();

    let stats = FlipStats::from_games(&games);
    Ok(FlipHistory {
        player,
        from_block: scan.from_block,
        to_block: scan.to_block,
        net: stats.net_display(),
        games,
        stats,
    })
}
