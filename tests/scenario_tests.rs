mod common;

use std::sync::{Arc, Mutex};

use common::*;
use ethers_core::abi::{encode, Token};
use ethers_core::types::{H256, U256};
use serde_json::{json, Value};

use monad_mcp_server::blockchain::abi::{CoinSide, ContractCall, EventKind};
use monad_mcp_server::blockchain::error::ChainError;
use monad_mcp_server::blockchain::models::{ChainLog, ReceiptStatus, TransferKind};
use monad_mcp_server::blockchain::rpc_pool::TransportError;
use monad_mcp_server::blockchain::services::{chain, coinflip, staking, transfer};
use monad_mcp_server::blockchain::ClientSettings;

const COINFLIP: u8 = 0xcf;
const VAULT: u8 = 0xa9;

fn settings() -> ClientSettings {
    ClientSettings {
        coinflip_contract: Some(addr(COINFLIP)),
        aprmon_contract: Some(addr(VAULT)),
        ..fast_settings()
    }
}

fn unexpected(method: &str) -> Result<Value, TransportError> {
    Err(TransportError::Rpc {
        code: -32601,
        message: format!("unexpected {}", method),
    })
}

fn flip_log(won: bool, bet: f64, payout: f64) -> ChainLog {
    log(
        addr(COINFLIP),
        EventKind::FlipResult,
        vec![topic_address(test_address())],
        vec![
            Token::Uint(U256::zero()),
            Token::Bool(won),
            Token::Bool(won),
            Token::Uint(mon(payout)),
            Token::Uint(mon(bet)),
            Token::FixedBytes(vec![0u8; 32]),
        ],
    )
}

/// Coinflip node whose pool holds `pool` and whose receipts carry `logs`.
fn coinflip_node(pool: U256, logs: Vec<ChainLog>) -> FakeTransport {
    FakeTransport::new("fake", move |method, params| {
        if let Some(answer) = common_write_method(method, params) {
            return answer;
        }
        match method {
            "eth_getBalance" => Ok(quantity(mon(10.0))),
            "eth_call" if call_selector(params) == selector(&ContractCall::GetTotalBalance) => Ok(uint_word(pool)),
            "eth_getTransactionReceipt" => Ok(receipt_json(&params[0], Some(1), &logs)),
            other => unexpected(other),
        }
    })
}

#[tokio::test]
async fn winning_flip_reports_payout_from_event() {
    let logs = vec![noise_log(addr(0x01)), flip_log(true, 0.01, 0.02), noise_log(addr(0x02))];
    let fake = coinflip_node(mon(5.0), logs);
    let client = client_with(fake.clone(), settings());

    let resp = coinflip::play(&client, "heads", "0.01", None).await.unwrap();
    assert_eq!(resp.choice, CoinSide::Heads);
    assert_eq!(resp.bet, "0.01");
    let result = resp.result.expect("FlipResult should decode");
    assert!(result.won);
    assert_eq!(result.outcome, CoinSide::Heads);
    assert_eq!(result.payout, "0.02");
    assert_eq!(fake.count("eth_sendRawTransaction"), 1);
}

#[tokio::test]
async fn losing_flip_has_no_payout() {
    let fake = coinflip_node(mon(5.0), vec![flip_log(false, 0.01, 0.0)]);
    let client = client_with(fake, settings());

    let result = coinflip::play(&client, "heads", "0.01", None)
        .await
        .unwrap()
        .result
        .unwrap();
    assert!(!result.won);
    assert_eq!(result.outcome, CoinSide::Tails);
    assert_eq!(result.payout, "0");
}

#[tokio::test]
async fn flip_without_result_event_still_confirms() {
    let fake = coinflip_node(mon(5.0), vec![noise_log(addr(0x01))]);
    let client = client_with(fake, settings());

    let resp = coinflip::play(&client, "tails", "0.01", None).await.unwrap();
    assert!(resp.result.is_none());
    assert_eq!(resp.block_number, Some(16));
}

#[tokio::test]
async fn thin_pool_refuses_the_bet_before_building() {
    let fake = coinflip_node(mon(0.015), vec![]);
    let client = client_with(fake.clone(), settings());

    let err = coinflip::play(&client, "heads", "0.01", None).await.unwrap_err();
    assert!(matches!(err, ChainError::InsufficientLiquidity(_)), "{:?}", err);
    assert_eq!(fake.count("eth_estimateGas"), 0);
    assert_eq!(fake.count("eth_sendRawTransaction"), 0);
}

#[tokio::test]
async fn bad_choice_and_zero_bet_are_rejected_offline() {
    let fake = coinflip_node(mon(5.0), vec![]);
    let client = client_with(fake.clone(), settings());

    for (choice, amount) in [("edge", "0.01"), ("heads", "0"), ("heads", "abc")] {
        let err = coinflip::play(&client, choice, amount, None).await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidArgument(_)), "{} {}", choice, amount);
    }
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn missing_contract_address_is_an_argument_error() {
    let fake = coinflip_node(mon(5.0), vec![]);
    let client = client_with(fake.clone(), fast_settings());

    let err = coinflip::get_pool_balance(&client).await.unwrap_err();
    assert!(matches!(err, ChainError::InvalidArgument(_)));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn history_scans_the_window_and_keeps_the_newest() {
    let filter: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let filter_in_node = Arc::clone(&filter);
    let fake = FakeTransport::new("fake", move |method, params| match method {
        "eth_blockNumber" => Ok(quantity(5000u64)),
        "eth_getLogs" => {
            *filter_in_node.lock().unwrap() = Some(params[0].clone());
            // oldest first, as nodes return them
            let logs = vec![
                with_position(flip_log(true, 1.0, 2.0), 4100, H256::repeat_byte(1)),
                with_position(flip_log(false, 0.5, 0.0), 4200, H256::repeat_byte(2)),
                with_position(flip_log(true, 0.25, 0.5), 4300, H256::repeat_byte(3)),
            ];
            Ok(json!(logs))
        }
        other => unexpected(other),
    });
    let client = client_with(fake, settings());

    let history = coinflip::get_history(&client, None, 2).await.unwrap();
    assert_eq!(history.from_block, 4000);
    assert_eq!(history.to_block, 5000);
    assert_eq!(history.games.len(), 2);
    assert_eq!(history.games[0].block_number, Some(4300));
    assert_eq!(history.games[1].block_number, Some(4200));

    assert_eq!(history.stats.games, 2);
    assert_eq!(history.stats.wins, 1);
    assert_eq!(history.stats.losses, 1);
    assert_eq!(history.stats.total_wagered, mon(0.75));
    assert_eq!(history.stats.total_payout, mon(0.5));
    assert_eq!(history.net, "-0.25");

    let filter = filter.lock().unwrap().clone().unwrap();
    assert_eq!(filter["fromBlock"], json!("0xfa0"));
    assert_eq!(filter["toBlock"], json!("0x1388"));
    assert_eq!(filter["topics"][0], json!(EventKind::FlipResult.topic0()));
    assert_eq!(filter["topics"][1], json!(topic_address(test_address())));
}

#[tokio::test]
async fn young_chain_scans_from_genesis() {
    let fake = FakeTransport::new("fake", |method, _| match method {
        "eth_blockNumber" => Ok(quantity(500u64)),
        "eth_getLogs" => Ok(json!([])),
        other => unexpected(other),
    });
    let client = client_with(fake, settings());

    let history = coinflip::get_history(&client, None, 10).await.unwrap();
    assert_eq!(history.from_block, 0);
    assert!(history.games.is_empty());
    assert_eq!(history.net, "+0");
}

#[tokio::test]
async fn claim_with_nothing_pending_is_not_broadcast() {
    let fake = FakeTransport::new("fake", |method, params| {
        if let Some(answer) = common_write_method(method, params) {
            return answer;
        }
        match method {
            "eth_call" => Ok(uint_word(0u64)),
            other => unexpected(other),
        }
    });
    let client = client_with(fake.clone(), settings());

    let err = staking::claim_redeem(&client, "7", None).await.unwrap_err();
    assert!(matches!(err, ChainError::NotFound(_)), "{:?}", err);
    assert_eq!(fake.count("eth_estimateGas"), 0);
    assert_eq!(fake.count("eth_sendRawTransaction"), 0);
}

fn redeem_request_log(request_id: u64, shares: f64, block: u64) -> ChainLog {
    let log = log(
        addr(VAULT),
        EventKind::RedeemRequest,
        vec![
            topic_address(test_address()),
            topic_address(test_address()),
            topic_uint(request_id),
        ],
        vec![
            Token::Address(test_address()),
            Token::Uint(mon(shares)),
            Token::Uint(mon(shares)),
        ],
    );
    with_position(log, block, H256::from_low_u64_be(request_id))
}

/// Request id argument of a `pendingRedeemRequest` call.
fn requested_id(params: &Value) -> U256 {
    let data = params[0]["data"].as_str().unwrap();
    U256::from_str_radix(&data[10..74], 16).unwrap()
}

#[tokio::test]
async fn pending_redeems_are_rechecked_against_the_vault() {
    let fake = FakeTransport::new("fake", |method, params| match method {
        "eth_blockNumber" => Ok(quantity(2000u64)),
        "eth_getLogs" => Ok(json!(vec![
            redeem_request_log(1, 1.0, 1500),
            redeem_request_log(2, 3.0, 1600),
        ])),
        "eth_call" => {
            // request 1 was already claimed
            if requested_id(params) == U256::from(1u64) {
                Ok(uint_word(0u64))
            } else {
                Ok(uint_word(mon(3.0)))
            }
        }
        other => unexpected(other),
    });
    let client = client_with(fake.clone(), settings());

    let pending = staking::get_pending_redeems(&client, None, 10).await.unwrap();
    assert_eq!(pending.controller, test_address());
    assert_eq!(pending.from_block, 1000);
    assert_eq!(pending.requests.len(), 2);

    let newest = &pending.requests[0];
    assert_eq!(newest.request_id, U256::from(2u64));
    assert!(newest.pending);
    assert_eq!(newest.pending_shares, "3");

    let claimed = &pending.requests[1];
    assert_eq!(claimed.request_id, U256::from(1u64));
    assert!(!claimed.pending);
    assert_eq!(claimed.requested_shares, "1");
    assert_eq!(fake.count("eth_call"), 2);
}

#[tokio::test]
async fn position_values_shares_in_assets() {
    let fake = FakeTransport::new("fake", |method, params| {
        let sel = call_selector(params);
        match method {
            "eth_call" if sel == selector(&ContractCall::BalanceOf { account: test_address() }) => {
                Ok(uint_word(mon(2.0)))
            }
            "eth_call" if sel == selector(&ContractCall::WithdrawalFee) => Ok(uint_word(50u64)),
            "eth_call" if sel == selector(&ContractCall::ConvertToAssets { shares: U256::zero() }) => {
                Ok(uint_word(mon(2.1)))
            }
            other => unexpected(other),
        }
    });
    let client = client_with(fake, settings());

    let position = staking::get_position(&client, None).await.unwrap();
    assert_eq!(position.owner, test_address());
    assert_eq!(position.shares, "2");
    assert_eq!(position.assets, "2.1");
    assert_eq!(position.withdrawal_fee, U256::from(50u64));
    assert_eq!(position.withdrawal_fee_percent, "0.5");
}

fn symbol_word(symbol: &str) -> Value {
    json!(format!("0x{}", hex::encode(encode(&[Token::String(symbol.into())]))))
}

/// Node that knows a single mined transaction with the given receipt status.
fn details_node(status: u64, logs: Vec<ChainLog>) -> FakeTransport {
    FakeTransport::new("fake", move |method, params| match method {
        "eth_getTransactionByHash" => Ok(json!({
            "hash": params[0],
            "from": test_address(),
            "to": addr(0x70),
            "value": "0x0",
            "input": "0x",
        })),
        "eth_getTransactionReceipt" => Ok(receipt_json(&params[0], Some(status), &logs)),
        "eth_getBlockByHash" => Ok(json!({
            "number": "0x10",
            "hash": H256::repeat_byte(0xbb),
            "parentHash": H256::repeat_byte(0xba),
            "timestamp": "0x6553f100",
            "gasUsed": "0x5208",
            "gasLimit": "0x1c9c380",
        })),
        "eth_call" => {
            let sel = call_selector(params);
            if sel == selector(&ContractCall::Decimals) {
                Ok(uint_word(6u64))
            } else if sel == selector(&ContractCall::Symbol) {
                Ok(symbol_word("USDC"))
            } else {
                unexpected("eth_call")
            }
        }
        other => unexpected(other),
    })
}

fn usdc_transfer() -> ChainLog {
    log(
        addr(0x70),
        EventKind::Transfer,
        vec![topic_address(test_address()), topic_address(addr(0x22))],
        vec![Token::Uint(U256::from(2_500_000u64))],
    )
}

#[tokio::test]
async fn successful_token_transfer_is_described_as_such() {
    let fake = details_node(1, vec![noise_log(addr(0x01)), usdc_transfer()]);
    let client = client_with(fake, settings());

    let hash = format!("{:?}", H256::repeat_byte(0x11));
    let details = chain::get_transaction_details(&client, &hash).await.unwrap();
    assert!(matches!(details.kind, TransferKind::Token));
    assert_eq!(details.status, ReceiptStatus::Success);
    assert_eq!(details.to, Some(addr(0x22)));
    assert_eq!(details.amount, "2.5");
    assert_eq!(details.symbol, "USDC");
    assert_eq!(details.block_number, Some(16));
    assert!(details.timestamp.is_some());
}

#[tokio::test]
async fn failed_transaction_logs_are_not_decoded() {
    let fake = details_node(0, vec![usdc_transfer()]);
    let client = client_with(fake.clone(), settings());

    let hash = format!("{:?}", H256::repeat_byte(0x11));
    let details = chain::get_transaction_details(&client, &hash).await.unwrap();
    assert!(matches!(details.kind, TransferKind::Native));
    assert_eq!(details.status, ReceiptStatus::Failure);
    assert_eq!(details.symbol, "MON");
    assert_eq!(details.amount, "0");
    assert_eq!(fake.count("eth_call"), 0);
}

#[tokio::test]
async fn pending_transaction_has_no_details_yet() {
    let fake = FakeTransport::new("fake", |method, params| match method {
        "eth_getTransactionByHash" => Ok(json!({
            "hash": params[0],
            "from": test_address(),
            "to": addr(0x70),
            "value": "0x1",
        })),
        "eth_getTransactionReceipt" => Ok(Value::Null),
        other => unexpected(other),
    });
    let client = client_with(fake, settings());

    let hash = format!("{:?}", H256::repeat_byte(0x11));
    let err = chain::get_transaction_details(&client, &hash).await.unwrap_err();
    assert!(matches!(err, ChainError::NotFound(_)));
}

/// Node serving one ERC-20-like contract (a token or the vault's shares) with
/// `balance` held by the wallet, plus receipts carrying `logs`.
fn erc20_node(balance: U256, decimals: u64, symbol: &'static str, logs: Vec<ChainLog>) -> FakeTransport {
    FakeTransport::new("fake", move |method, params| {
        if let Some(answer) = common_write_method(method, params) {
            return answer;
        }
        match method {
            "eth_getBalance" => Ok(quantity(mon(10.0))),
            "eth_getTransactionReceipt" => Ok(receipt_json(&params[0], Some(1), &logs)),
            "eth_call" => {
                let sel = call_selector(params);
                if sel == selector(&ContractCall::Decimals) {
                    Ok(uint_word(decimals))
                } else if sel == selector(&ContractCall::Symbol) {
                    Ok(symbol_word(symbol))
                } else if sel == selector(&ContractCall::BalanceOf { account: test_address() }) {
                    Ok(uint_word(balance))
                } else {
                    unexpected("eth_call")
                }
            }
            other => unexpected(other),
        }
    })
}

#[tokio::test]
async fn token_transfer_reports_the_amount_the_token_moved() {
    // a fee-on-transfer token delivers less than was sent
    let moved = log(
        addr(0x70),
        EventKind::Transfer,
        vec![topic_address(test_address()), topic_address(addr(0x22))],
        vec![Token::Uint(U256::from(2_400_000u64))],
    );
    let fake = erc20_node(U256::from(5_000_000u64), 6, "USDC", vec![noise_log(addr(0x01)), moved]);
    let client = client_with(fake.clone(), settings());

    let resp = transfer::send_token(
        &client,
        &format!("{:?}", addr(0x70)),
        &format!("{:?}", addr(0x22)),
        "2.5",
        None,
    )
    .await
    .unwrap();
    assert_eq!(resp.token, Some(addr(0x70)));
    assert_eq!(resp.to, addr(0x22));
    assert_eq!(resp.amount, "2.4");
    assert_eq!(resp.symbol, "USDC");
    assert_eq!(fake.count("eth_sendRawTransaction"), 1);
}

#[tokio::test]
async fn token_shortfall_stops_before_estimation() {
    let fake = erc20_node(U256::from(1_000_000u64), 6, "USDC", vec![]);
    let client = client_with(fake.clone(), settings());

    let err = transfer::send_token(
        &client,
        &format!("{:?}", addr(0x70)),
        &format!("{:?}", addr(0x22)),
        "2.5",
        None,
    )
    .await
    .unwrap_err();
    match err {
        ChainError::InsufficientFunds { required, available, unit } => {
            assert_eq!(required, "2.5");
            assert_eq!(available, "1");
            assert_eq!(unit, "USDC");
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert_eq!(fake.count("eth_estimateGas"), 0);
    assert_eq!(fake.count("eth_gasPrice"), 0);
    assert_eq!(fake.count("eth_sendRawTransaction"), 0);
}

#[tokio::test]
async fn deposit_reports_shares_minted() {
    let minted = log(
        addr(VAULT),
        EventKind::Deposit,
        vec![topic_address(test_address()), topic_address(test_address())],
        vec![Token::Uint(mon(1.0)), Token::Uint(mon(0.95))],
    );
    let fake = erc20_node(U256::zero(), 18, "aprMON", vec![minted]);
    let client = client_with(fake.clone(), settings());

    let resp = staking::deposit(&client, "1", None).await.unwrap();
    assert_eq!(resp.assets, "1");
    assert_eq!(resp.shares.as_deref(), Some("0.95"));
    assert_eq!(resp.block_number, Some(16));
    assert_eq!(fake.count("eth_sendRawTransaction"), 1);
}

#[tokio::test]
async fn redeem_request_reports_its_id() {
    let fake = erc20_node(mon(2.0), 18, "aprMON", vec![redeem_request_log(42, 1.0, 16)]);
    let client = client_with(fake.clone(), settings());

    let resp = staking::request_redeem(&client, "1", None).await.unwrap();
    assert_eq!(resp.shares, "1");
    assert_eq!(resp.request_id, Some(U256::from(42u64)));
    assert_eq!(resp.assets.as_deref(), Some("1"));
    assert_eq!(fake.count("eth_sendRawTransaction"), 1);
}

#[tokio::test]
async fn redeem_request_needs_enough_shares() {
    let fake = erc20_node(mon(0.5), 18, "aprMON", vec![]);
    let client = client_with(fake.clone(), settings());

    let err = staking::request_redeem(&client, "1", None).await.unwrap_err();
    match err {
        ChainError::InsufficientFunds { required, available, unit } => {
            assert_eq!(required, "1");
            assert_eq!(available, "0.5");
            assert_eq!(unit, "aprMON");
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert_eq!(fake.count("eth_estimateGas"), 0);
    assert_eq!(fake.count("eth_sendRawTransaction"), 0);
}
