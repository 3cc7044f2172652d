//! # MCP Handler Module
//!
//! Implements the Model Context Protocol for the Monad testnet server. Incoming
//! requests are dispatched to the tool logic in `blockchain::services`.
//!
//! ## Supported Tools
//!
//! ### Chain Queries
//! - `get-mon-balance` - Native MON balance of an address
//! - `get-token-balance` - ERC-20 balance of an address
//! - `get-multiple-balances` - Several ERC-20 balances at once
//! - `get-transaction-details` - Transaction, receipt and transfer summary
//! - `get-gas-price` - Current gas price in Gwei
//! - `get-latest-block` - Latest block header
//!
//! ### Transfers
//! - `send-mon` - Send MON from the server wallet
//! - `send-token` - Send an ERC-20 token from the server wallet
//!
//! ### Coinflip
//! - `coinflip-play` - Wager MON on heads or tails
//! - `coinflip-pool-balance` - Payout pool of the game
//! - `coinflip-history` - Recent rounds and win/loss statistics
//!
//! ### aprMON Vault
//! - `aprmon-deposit` - Stake MON for aprMON shares
//! - `aprmon-request-redeem` - Start a redemption
//! - `aprmon-claim-redeem` - Claim a matured redemption
//! - `aprmon-position` - Share balance and asset value
//! - `aprmon-pending-redeems` - Open redeem requests

use ethers_core::types::Address;
use ethers_core::utils::to_checksum;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    blockchain::{
        client::MonadClient,
        error::ChainError,
        models::{ReceiptStatus, TransferKind},
        rpc_pool::RpcTransport,
        services::{balance, chain, coinflip, staking, transfer},
        units::format_mon,
    },
    mcp::protocol::{
        error_codes, tool_failure, tool_success, Request, Response, ToolCallParams,
        PROTOCOL_VERSION,
    },
    utils, AppState,
};

/// Rows returned by the history tools when `limit` is not given.
const DEFAULT_HISTORY_LIMIT: usize = 10;
const MAX_HISTORY_LIMIT: usize = 100;

/// Why a tool call did not produce a success result.
enum ToolError {
    /// Malformed arguments; answered with a JSON-RPC error.
    Params(Response),
    /// Engine failure; answered with an `isError` tool result.
    Chain(ChainError),
}

impl From<Response> for ToolError {
    fn from(resp: Response) -> Self {
        ToolError::Params(resp)
    }
}

impl From<ChainError> for ToolError {
    fn from(err: ChainError) -> Self {
        ToolError::Chain(err)
    }
}

type ToolResult = Result<(String, Value), ToolError>;

fn payload<S: Serialize>(value: &S) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

/// This is the main dispatcher for all incoming MCP requests.
pub async fn handle_mcp_request<T: RpcTransport>(req: Request, state: AppState<T>) -> Option<Response> {
    info!("Handling MCP request for method: {}", req.method);

    if req.is_notification() {
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        "ping" => Response::success(req.id.clone(), json!({})),
        "tools/list" => handle_tools_list(&req),
        "tools/call" => handle_tool_call(req, state).await,
        _ => Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Some(response)
}

/// Handles a 'tools/call' request by dispatching it to the correct tool logic.
async fn handle_tool_call<T: RpcTransport>(req: Request, state: AppState<T>) -> Response {
    let params: ToolCallParams = match req.params.clone().map(serde_json::from_value::<ToolCallParams>) {
        Some(Ok(p)) => p,
        Some(Err(e)) => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                format!("Invalid tools/call params: {}", e),
            )
        }
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'params' object".into(),
            )
        }
    };

    let client = state.client.as_ref();
    let args = &params.arguments;
    let req_id = &req.id;

    let result = match params.name.as_str() {
        "get-mon-balance" => get_mon_balance(client, args, req_id).await,
        "get-token-balance" => get_token_balance(client, args, req_id).await,
        "get-multiple-balances" => get_multiple_balances(client, args, req_id).await,
        "get-transaction-details" => get_transaction_details(client, args, req_id).await,
        "get-gas-price" => get_gas_price(client).await,
        "get-latest-block" => get_latest_block(client).await,
        "send-mon" => send_mon(client, args, req_id).await,
        "send-token" => send_token(client, args, req_id).await,
        "coinflip-play" => coinflip_play(client, args, req_id).await,
        "coinflip-pool-balance" => coinflip_pool_balance(client).await,
        "coinflip-history" => coinflip_history(client, args, req_id).await,
        "aprmon-deposit" => aprmon_deposit(client, args, req_id).await,
        "aprmon-request-redeem" => aprmon_request_redeem(client, args, req_id).await,
        "aprmon-claim-redeem" => aprmon_claim_redeem(client, args, req_id).await,
        "aprmon-position" => aprmon_position(client, args, req_id).await,
        "aprmon-pending-redeems" => aprmon_pending_redeems(client, args, req_id).await,
        other => {
            return Response::error(
                req.id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown tool: {}", other),
            )
        }
    };

    match result {
        Ok((text, data)) => Response::success(req.id.clone(), tool_success(text, data)),
        Err(ToolError::Params(resp)) => resp,
        Err(ToolError::Chain(err)) => {
            warn!("Tool '{}' failed: {}", params.name, err);
            Response::success(
                req.id.clone(),
                tool_failure(format!("Failed to run {}: {}", params.name, err), err.kind()),
            )
        }
    }
}

// --- Chain queries ---

async fn get_mon_balance<T: RpcTransport>(client: &MonadClient<T>, args: &Value, req_id: &Value) -> ToolResult {
    let address = utils::get_required_arg::<String>(args, "address", req_id)?;
    let balance = balance::get_mon_balance(client, &address).await?;
    let text = format!(
        "Balance for {}: {} {}",
        checksum(&balance.address),
        balance.amount,
        balance.symbol
    );
    Ok((text, payload(&balance)))
}

async fn get_token_balance<T: RpcTransport>(client: &MonadClient<T>, args: &Value, req_id: &Value) -> ToolResult {
    let address = utils::get_required_arg::<String>(args, "address", req_id)?;
    let token = utils::get_required_arg::<String>(args, "tokenContract", req_id)?;
    let balance = balance::get_token_balance(client, &token, &address).await?;
    let text = format!(
        "Token balance for {}: {} {}",
        address.trim(),
        balance.amount,
        balance.token.symbol
    );
    Ok((text, payload(&balance)))
}

async fn get_multiple_balances<T: RpcTransport>(
    client: &MonadClient<T>,
    args: &Value,
    req_id: &Value,
) -> ToolResult {
    let address = utils::get_required_arg::<String>(args, "address", req_id)?;
    let tokens = utils::get_required_arg::<Vec<String>>(args, "tokenContracts", req_id)?;
    let balances = balance::get_multiple_balances(client, &address, &tokens).await?;
    let lines: Vec<String> = balances
        .iter()
        .map(|b| format!("{}: {} ({})", b.token.symbol, b.amount, checksum(&b.token.address)))
        .collect();
    let text = format!("Token Balances for {}:\n{}", address.trim(), lines.join("\n"));
    Ok((text, json!({ "address": address.trim(), "balances": payload(&balances) })))
}

async fn get_transaction_details<T: RpcTransport>(
    client: &MonadClient<T>,
    args: &Value,
    req_id: &Value,
) -> ToolResult {
    let hash = utils::get_required_arg::<String>(args, "hash", req_id)?;
    let details = chain::get_transaction_details(client, &hash).await?;
    let kind = match details.kind {
        TransferKind::Native => "Native MON Transfer",
        TransferKind::Token => "Token Transfer",
    };
    let status = match details.status {
        ReceiptStatus::Success => "Success",
        ReceiptStatus::Failure => "Failed",
    };
    let text = format!(
        "Transaction Details:\nType: {}\nFrom: {}\nTo: {}\nAmount: {} {}\nDate: {}\nStatus: {}\nBlock: {}\nGas Used: {}",
        kind,
        checksum(&details.from),
        details.to.as_ref().map(checksum).unwrap_or_else(|| "contract creation".into()),
        details.amount,
        details.symbol,
        details
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".into()),
        status,
        details
            .block_number
            .map(|b| b.to_string())
            .unwrap_or_else(|| "pending".into()),
        details
            .gas_used
            .map(|g| g.to_string())
            .unwrap_or_else(|| "unknown".into()),
    );
    Ok((text, payload(&details)))
}

async fn get_gas_price<T: RpcTransport>(client: &MonadClient<T>) -> ToolResult {
    let price = chain::get_gas_price(client).await?;
    Ok((format!("Current Gas Price: {} Gwei", price.gwei), payload(&price)))
}

async fn get_latest_block<T: RpcTransport>(client: &MonadClient<T>) -> ToolResult {
    let block = chain::get_latest_block(client).await?;
    let text = format!(
        "Latest Block Information:\nBlock Number: {}\nTimestamp: {}\nHash: {}\nParent Hash: {:?}\nTransactions Count: {}\nGas Used: {}\nGas Limit: {}",
        block.number.map(|n| n.to_string()).unwrap_or_else(|| "pending".into()),
        block
            .datetime()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| block.timestamp.to_string()),
        block.hash.map(|h| format!("{:?}", h)).unwrap_or_else(|| "pending".into()),
        block.parent_hash,
        block.transactions.len(),
        block.gas_used,
        block.gas_limit,
    );
    Ok((text, payload(&block)))
}

// --- Transfers ---

fn transfer_text(resp: &transfer::TransferResponse) -> String {
    format!(
        "Transfer confirmed\nTransaction: {:?}\nFrom: {}\nTo: {}\nAmount: {} {}\nBlock: {}\nGas Used: {} (limit {}, max fee {} MON)",
        resp.hash,
        checksum(&resp.from),
        checksum(&resp.to),
        resp.amount,
        resp.symbol,
        resp.block_number.map(|b| b.to_string()).unwrap_or_else(|| "unknown".into()),
        resp.gas_used.map(|g| g.to_string()).unwrap_or_else(|| "unknown".into()),
        resp.gas.applied_limit,
        format_mon(resp.gas.max_fee()),
    )
}

async fn send_mon<T: RpcTransport>(client: &MonadClient<T>, args: &Value, req_id: &Value) -> ToolResult {
    let to = utils::get_required_arg::<String>(args, "to", req_id)?;
    let amount = utils::get_required_arg::<String>(args, "amount", req_id)?;
    let timeout = utils::get_timeout_arg(args, req_id)?;
    let resp = transfer::send_mon(client, &to, &amount, timeout).await?;
    Ok((transfer_text(&resp), payload(&resp)))
}

async fn send_token<T: RpcTransport>(client: &MonadClient<T>, args: &Value, req_id: &Value) -> ToolResult {
    let token = utils::get_required_arg::<String>(args, "tokenContract", req_id)?;
    let to = utils::get_required_arg::<String>(args, "to", req_id)?;
    let amount = utils::get_required_arg::<String>(args, "amount", req_id)?;
    let timeout = utils::get_timeout_arg(args, req_id)?;
    let resp = transfer::send_token(client, &token, &to, &amount, timeout).await?;
    Ok((transfer_text(&resp), payload(&resp)))
}

// --- Coinflip ---

fn history_limit(args: &Value, req_id: &Value) -> Result<usize, Response> {
    let limit = utils::get_optional_arg::<usize>(args, "limit", req_id)?.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(Response::error(
            req_id.clone(),
            error_codes::INVALID_PARAMS,
            format!("'limit' must be between 1 and {}", MAX_HISTORY_LIMIT),
        ));
    }
    Ok(limit)
}

async fn coinflip_play<T: RpcTransport>(client: &MonadClient<T>, args: &Value, req_id: &Value) -> ToolResult {
    let choice = utils::get_required_arg::<String>(args, "choice", req_id)?;
    let amount = utils::get_required_arg::<String>(args, "amount", req_id)?;
    let timeout = utils::get_timeout_arg(args, req_id)?;
    let resp = coinflip::play(client, &choice, &amount, timeout).await?;

    let outcome = match &resp.result {
        Some(r) if r.won => format!("Result: {}\nYou won {} MON!", r.outcome.label(), r.payout),
        Some(r) => format!("Result: {}\nYou lost {} MON.", r.outcome.label(), resp.bet),
        None => "Result: not reported in the receipt".to_string(),
    };
    let text = format!(
        "Coinflip played\nTransaction: {:?}\nChoice: {}\nBet: {} MON\n{}",
        resp.hash,
        resp.choice.label(),
        resp.bet,
        outcome
    );
    Ok((text, payload(&resp)))
}

async fn coinflip_pool_balance<T: RpcTransport>(client: &MonadClient<T>) -> ToolResult {
    let pool = coinflip::get_pool_balance(client).await?;
    let text = format!("Coinflip pool {}: {} MON", checksum(&pool.contract), pool.amount);
    Ok((text, payload(&pool)))
}

async fn coinflip_history<T: RpcTransport>(client: &MonadClient<T>, args: &Value, req_id: &Value) -> ToolResult {
    let player = utils::get_optional_arg::<String>(args, "address", req_id)?;
    let limit = history_limit(args, req_id)?;
    let history = coinflip::get_history(client, player.as_deref(), limit).await?;

    let mut lines = vec![format!(
        "Coinflip history for {} (blocks {}..{}):",
        checksum(&history.player),
        history.from_block,
        history.to_block
    )];
    if history.games.is_empty() {
        lines.push("No games found in the scanned window.".to_string());
    }
    for game in &history.games {
        lines.push(format!(
            "- block {}: bet {} MON on {}, landed {}, {}",
            game.block_number.map(|b| b.to_string()).unwrap_or_else(|| "?".into()),
            format_mon(game.bet),
            game.choice.label(),
            game.outcome.label(),
            if game.won {
                format!("won {} MON", format_mon(game.payout))
            } else {
                "lost".to_string()
            }
        ));
    }
    let stats = &history.stats;
    lines.push(format!(
        "Games: {} | Wins: {} | Losses: {} | Wagered: {} MON | Payout: {} MON | Net: {} MON",
        stats.games,
        stats.wins,
        stats.losses,
        format_mon(stats.total_wagered),
        format_mon(stats.total_payout),
        history.net
    ));
    Ok((lines.join("\n"), payload(&history)))
}

// --- aprMON vault ---

async fn aprmon_deposit<T: RpcTransport>(client: &MonadClient<T>, args: &Value, req_id: &Value) -> ToolResult {
    let amount = utils::get_required_arg::<String>(args, "amount", req_id)?;
    let timeout = utils::get_timeout_arg(args, req_id)?;
    let resp = staking::deposit(client, &amount, timeout).await?;
    let text = format!(
        "Deposit confirmed\nTransaction: {:?}\nDeposited: {} MON\nShares received: {}",
        resp.hash,
        resp.assets,
        resp.shares
            .as_deref()
            .map(|s| format!("{} aprMON", s))
            .unwrap_or_else(|| "not reported".into())
    );
    Ok((text, payload(&resp)))
}

async fn aprmon_request_redeem<T: RpcTransport>(
    client: &MonadClient<T>,
    args: &Value,
    req_id: &Value,
) -> ToolResult {
    let shares = utils::get_required_arg::<String>(args, "shares", req_id)?;
    let timeout = utils::get_timeout_arg(args, req_id)?;
    let resp = staking::request_redeem(client, &shares, timeout).await?;
    let text = format!(
        "Redeem requested\nTransaction: {:?}\nShares: {} aprMON\nRequest ID: {}\nExpected assets: {}",
        resp.hash,
        resp.shares,
        resp.request_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "not reported".into()),
        resp.assets
            .as_deref()
            .map(|a| format!("{} MON", a))
            .unwrap_or_else(|| "not reported".into())
    );
    Ok((text, payload(&resp)))
}

async fn aprmon_claim_redeem<T: RpcTransport>(
    client: &MonadClient<T>,
    args: &Value,
    req_id: &Value,
) -> ToolResult {
    // accept the id as a JSON number or a decimal string
    let request_id = match args.get("requestId") {
        Some(Value::Number(n)) => n.to_string(),
        _ => utils::get_required_arg::<String>(args, "requestId", req_id)?,
    };
    let timeout = utils::get_timeout_arg(args, req_id)?;
    let resp = staking::claim_redeem(client, &request_id, timeout).await?;
    let text = format!(
        "Redeem claimed\nTransaction: {:?}\nRequest ID: {}\nShares redeemed: {} aprMON\nAssets received: {}\nFee: {}",
        resp.hash,
        resp.request_id,
        resp.pending_shares,
        resp.assets
            .as_deref()
            .map(|a| format!("{} MON", a))
            .unwrap_or_else(|| "not reported".into()),
        resp.fee
            .as_deref()
            .map(|f| format!("{} MON", f))
            .unwrap_or_else(|| "not reported".into())
    );
    Ok((text, payload(&resp)))
}

async fn aprmon_position<T: RpcTransport>(client: &MonadClient<T>, args: &Value, req_id: &Value) -> ToolResult {
    let owner = utils::get_optional_arg::<String>(args, "address", req_id)?;
    let position = staking::get_position(client, owner.as_deref()).await?;
    let text = format!(
        "aprMON position for {}:\nShares: {} aprMON\nValue: {} MON\nWithdrawal fee: {}% ({} bps)",
        checksum(&position.owner),
        position.shares,
        position.assets,
        position.withdrawal_fee_percent,
        position.withdrawal_fee
    );
    Ok((text, payload(&position)))
}

async fn aprmon_pending_redeems<T: RpcTransport>(
    client: &MonadClient<T>,
    args: &Value,
    req_id: &Value,
) -> ToolResult {
    let controller = utils::get_optional_arg::<String>(args, "address", req_id)?;
    let limit = history_limit(args, req_id)?;
    let pending = staking::get_pending_redeems(client, controller.as_deref(), limit).await?;

    let mut lines = vec![format!(
        "Redeem requests for {} (blocks {}..{}):",
        checksum(&pending.controller),
        pending.from_block,
        pending.to_block
    )];
    if pending.requests.is_empty() {
        lines.push("No redeem requests found in the scanned window.".to_string());
    }
    for r in &pending.requests {
        let state = if r.pending {
            format!("pending {} aprMON", r.pending_shares)
        } else {
            "resolved".to_string()
        };
        lines.push(format!(
            "- #{}: requested {} aprMON, {}",
            r.request_id, r.requested_shares, state
        ));
    }
    Ok((lines.join("\n"), payload(&pending)))
}

/// Handles the 'initialize' request.
fn handle_initialize(req: &Request) -> Response {
    let server_info = json!({
        "name": "monad_mcp",
        "version": env!("CARGO_PKG_VERSION")
    });
    let capabilities = json!({ "tools": { "listChanged": false } });
    let instructions = "Monad testnet MCP server: balance and transaction queries, MON and token transfers, the coinflip game and the aprMON staking vault.";

    Response::success(
        req.id.clone(),
        json!({
            "serverInfo": server_info,
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": capabilities,
            "instructions": instructions
        }),
    )
}

/// Handles the 'tools/list' request by returning a JSON definition of all available tools.
fn handle_tools_list(req: &Request) -> Response {
    let address = json!({"type": "string", "pattern": "^0x[a-fA-F0-9]{40}$"});
    let amount = json!({"type": "string", "pattern": "^[0-9]+(\\.[0-9]+)?$"});
    let timeout = json!({"type": "integer", "minimum": 1, "description": "Give up waiting for confirmation after this many seconds."});
    let limit = json!({"type": "integer", "minimum": 1, "maximum": MAX_HISTORY_LIMIT, "description": "Maximum number of entries (default 10)."});

    let tools = json!([
        {
            "name": "get-mon-balance",
            "description": "Get MON balance for an address on Monad testnet",
            "inputSchema": {
                "type": "object",
                "properties": { "address": address },
                "required": ["address"]
            }
        },
        {
            "name": "get-token-balance",
            "description": "Get token balance for an address from a specific token contract",
            "inputSchema": {
                "type": "object",
                "properties": { "address": address, "tokenContract": address },
                "required": ["address", "tokenContract"]
            }
        },
        {
            "name": "get-multiple-balances",
            "description": "Get balances for multiple tokens at once",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "address": address,
                    "tokenContracts": {"type": "array", "items": address}
                },
                "required": ["address", "tokenContracts"]
            }
        },
        {
            "name": "get-transaction-details",
            "description": "Get detailed information about a transaction",
            "inputSchema": {
                "type": "object",
                "properties": { "hash": {"type": "string", "pattern": "^0x[a-fA-F0-9]{64}$"} },
                "required": ["hash"]
            }
        },
        {
            "name": "get-gas-price",
            "description": "Get current gas price on Monad testnet",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "get-latest-block",
            "description": "Get information about the latest block on Monad testnet",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "send-mon",
            "description": "Send MON from the server wallet and wait for confirmation",
            "inputSchema": {
                "type": "object",
                "properties": { "to": address, "amount": amount, "timeout_secs": timeout },
                "required": ["to", "amount"]
            }
        },
        {
            "name": "send-token",
            "description": "Send an ERC-20 token from the server wallet and wait for confirmation",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tokenContract": address,
                    "to": address,
                    "amount": amount,
                    "timeout_secs": timeout
                },
                "required": ["tokenContract", "to", "amount"]
            }
        },
        {
            "name": "coinflip-play",
            "description": "Bet MON on heads or tails. The payout pool must hold at least twice the bet.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "choice": {"type": "string", "enum": ["heads", "tails"]},
                    "amount": amount,
                    "timeout_secs": timeout
                },
                "required": ["choice", "amount"]
            }
        },
        {
            "name": "coinflip-pool-balance",
            "description": "Get the coinflip payout pool balance",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "coinflip-history",
            "description": "Recent coinflip games of a player with win/loss statistics (last 1000 blocks by default)",
            "inputSchema": {
                "type": "object",
                "properties": { "address": address, "limit": limit }
            }
        },
        {
            "name": "aprmon-deposit",
            "description": "Stake MON in the aprMON vault",
            "inputSchema": {
                "type": "object",
                "properties": { "amount": amount, "timeout_secs": timeout },
                "required": ["amount"]
            }
        },
        {
            "name": "aprmon-request-redeem",
            "description": "Request redemption of aprMON shares; returns the request id to claim later",
            "inputSchema": {
                "type": "object",
                "properties": { "shares": amount, "timeout_secs": timeout },
                "required": ["shares"]
            }
        },
        {
            "name": "aprmon-claim-redeem",
            "description": "Claim a matured aprMON redeem request",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "requestId": {"type": ["string", "integer"], "description": "Id returned by aprmon-request-redeem"},
                    "timeout_secs": timeout
                },
                "required": ["requestId"]
            }
        },
        {
            "name": "aprmon-position",
            "description": "aprMON share balance, its MON value and the withdrawal fee",
            "inputSchema": {
                "type": "object",
                "properties": { "address": address }
            }
        },
        {
            "name": "aprmon-pending-redeems",
            "description": "Redeem requests created recently and whether each is still pending",
            "inputSchema": {
                "type": "object",
                "properties": { "address": address, "limit": limit }
            }
        }
    ]);

    Response::success(req.id.clone(), json!({ "tools": tools }))
}
