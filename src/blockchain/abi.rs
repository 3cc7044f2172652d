// src/blockchain/abi.rs
//
// Static schemas for the contracts this server talks to: an ERC-20 token, the
// coinflip wager game and the aprMON staking vault. Functions and events are
// closed enums, so encoding and decoding are matches rather than runtime ABI
// reflection.

use ethers_core::abi::{decode, encode, ParamType, Token};
use ethers_core::types::{Address, Bytes, H256, U256};
use ethers_core::utils::keccak256;
use serde::Serialize;

use crate::blockchain::error::{ChainError, ChainResult};
use crate::blockchain::models::ChainLog;

fn selector(sig: &str) -> [u8; 4] {
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&keccak256(sig.as_bytes())[0..4]);
    sel
}

/// Side of the coin, encoded as the contract's `Choice` enum (uint8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoinSide {
    Heads = 0,
    Tails = 1,
}

impl CoinSide {
    pub fn parse(input: &str) -> ChainResult<Self> {
        match input.trim().to_lowercase().as_str() {
            "heads" | "head" | "h" | "0" => Ok(CoinSide::Heads),
            "tails" | "tail" | "t" | "1" => Ok(CoinSide::Tails),
            other => Err(ChainError::invalid(format!(
                "choice '{}' must be 'heads' or 'tails'",
                other
            ))),
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CoinSide::Heads),
            1 => Some(CoinSide::Tails),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            CoinSide::Heads => CoinSide::Tails,
            CoinSide::Tails => CoinSide::Heads,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CoinSide::Heads => "Heads",
            CoinSide::Tails => "Tails",
        }
    }
}

/// Every contract function the engine calls, with its typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    // ERC-20 (the vault shares use the same `balanceOf`/`decimals`)
    BalanceOf { account: Address },
    Decimals,
    Symbol,
    Transfer { recipient: Address, amount: U256 },
    // Coinflip
    FlipCoin { choice: CoinSide },
    GetTotalBalance,
    // aprMON vault
    Deposit { assets: U256, receiver: Address },
    RequestRedeem { shares: U256, controller: Address, owner: Address },
    Redeem { request_id: U256, receiver: Address },
    ConvertToAssets { shares: U256 },
    WithdrawalFee,
    PendingRedeemRequest { request_id: U256, controller: Address },
}

impl ContractCall {
    pub fn signature(&self) -> &'static str {
        match self {
            ContractCall::BalanceOf { .. } => "balanceOf(address)",
            ContractCall::Decimals => "decimals()",
            ContractCall::Symbol => "symbol()",
            ContractCall::Transfer { .. } => "transfer(address,uint256)",
            ContractCall::FlipCoin { .. } => "flipCoin(uint8)",
            ContractCall::GetTotalBalance => "getTotalBalance()",
            ContractCall::Deposit { .. } => "deposit(uint256,address)",
            ContractCall::RequestRedeem { .. } => "requestRedeem(uint256,address,address)",
            ContractCall::Redeem { .. } => "redeem(uint256,address)",
            ContractCall::ConvertToAssets { .. } => "convertToAssets(uint256)",
            ContractCall::WithdrawalFee => "withdrawalFee()",
            ContractCall::PendingRedeemRequest { .. } => "pendingRedeemRequest(uint256,address)",
        }
    }

    fn arguments(&self) -> Vec<Token> {
        match self {
            ContractCall::BalanceOf { account } => vec![Token::Address(*account)],
            ContractCall::Transfer { recipient, amount } => {
                vec![Token::Address(*recipient), Token::Uint(*amount)]
            }
            ContractCall::FlipCoin { choice } => vec![Token::Uint(U256::from(*choice as u8))],
            ContractCall::Deposit { assets, receiver } => {
                vec![Token::Uint(*assets), Token::Address(*receiver)]
            }
            ContractCall::RequestRedeem { shares, controller, owner } => vec![
                Token::Uint(*shares),
                Token::Address(*controller),
                Token::Address(*owner),
            ],
            ContractCall::Redeem { request_id, receiver } => {
                vec![Token::Uint(*request_id), Token::Address(*receiver)]
            }
            ContractCall::ConvertToAssets { shares } => vec![Token::Uint(*shares)],
            ContractCall::PendingRedeemRequest { request_id, controller } => {
                vec![Token::Uint(*request_id), Token::Address(*controller)]
            }
            ContractCall::Decimals
            | ContractCall::Symbol
            | ContractCall::GetTotalBalance
            | ContractCall::WithdrawalFee => vec![],
        }
    }

    /// Selector followed by the ABI-encoded arguments.
    pub fn calldata(&self) -> Bytes {
        let mut out = selector(self.signature()).to_vec();
        out.extend(encode(&self.arguments()));
        Bytes::from(out)
    }

    /// Whether the call may carry a native value.
    pub fn is_payable(&self) -> bool {
        matches!(self, ContractCall::FlipCoin { .. } | ContractCall::Deposit { .. })
    }

    fn output_types(&self) -> Vec<ParamType> {
        match self {
            ContractCall::Decimals => vec![ParamType::Uint(8)],
            ContractCall::Symbol => vec![ParamType::String],
            ContractCall::Transfer { .. } => vec![ParamType::Bool],
            ContractCall::RequestRedeem { .. } => vec![ParamType::Uint(256)],
            ContractCall::FlipCoin { .. } | ContractCall::Redeem { .. } => vec![],
            ContractCall::BalanceOf { .. }
            | ContractCall::GetTotalBalance
            | ContractCall::Deposit { .. }
            | ContractCall::ConvertToAssets { .. }
            | ContractCall::WithdrawalFee
            | ContractCall::PendingRedeemRequest { .. } => vec![ParamType::Uint(256)],
        }
    }

    pub fn decode_output(&self, data: &[u8]) -> ChainResult<Vec<Token>> {
        decode(&self.output_types(), data).map_err(|e| {
            ChainError::DecodeMismatch(format!("{} output: {}", self.signature(), e))
        })
    }

    /// Convenience for the many single-uint256 view functions.
    pub fn decode_uint(&self, data: &[u8]) -> ChainResult<U256> {
        let tokens = self.decode_output(data)?;
        tokens
            .into_iter()
            .next()
            .and_then(Token::into_uint)
            .ok_or_else(|| ChainError::DecodeMismatch(format!("{} output", self.signature())))
    }
}

/// Decodes a `symbol()` result that may be an ABI string or a bytes32.
pub fn decode_symbol(data: &[u8]) -> Option<String> {
    if let Ok(tokens) = decode(&[ParamType::String], data) {
        if let Some(Token::String(s)) = tokens.into_iter().next() {
            return Some(s);
        }
    }
    if let Ok(tokens) = decode(&[ParamType::FixedBytes(32)], data) {
        if let Some(Token::FixedBytes(b)) = tokens.into_iter().next() {
            let s: Vec<u8> = b.into_iter().take_while(|c| *c != 0u8).collect();
            return String::from_utf8(s).ok().filter(|s| !s.is_empty());
        }
    }
    None
}

/// Events the engine knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Transfer,
    FlipResult,
    Deposit,
    RedeemRequest,
    Redeem,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Transfer => "Transfer",
            EventKind::FlipResult => "FlipResult",
            EventKind::Deposit => "Deposit",
            EventKind::RedeemRequest => "RedeemRequest",
            EventKind::Redeem => "Redeem",
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::Transfer => "Transfer(address,address,uint256)",
            EventKind::FlipResult => "FlipResult(address,uint8,bool,bool,uint256,uint256,bytes32)",
            EventKind::Deposit => "Deposit(address,address,uint256,uint256)",
            EventKind::RedeemRequest => "RedeemRequest(address,address,uint256,address,uint256,uint256)",
            EventKind::Redeem => "Redeem(address,address,uint256,uint256,uint256,uint256)",
        }
    }

    /// keccak256 of the canonical signature, i.e. topic 0.
    pub fn topic0(&self) -> H256 {
        H256::from(keccak256(self.signature().as_bytes()))
    }

    fn indexed_types(&self) -> Vec<ParamType> {
        match self {
            EventKind::Transfer | EventKind::Deposit => vec![ParamType::Address, ParamType::Address],
            EventKind::FlipResult => vec![ParamType::Address],
            EventKind::RedeemRequest | EventKind::Redeem => {
                vec![ParamType::Address, ParamType::Address, ParamType::Uint(256)]
            }
        }
    }

    fn data_types(&self) -> Vec<ParamType> {
        match self {
            EventKind::Transfer => vec![ParamType::Uint(256)],
            EventKind::FlipResult => vec![
                ParamType::Uint(8),
                ParamType::Bool,
                ParamType::Bool,
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::FixedBytes(32),
            ],
            EventKind::Deposit => vec![ParamType::Uint(256), ParamType::Uint(256)],
            EventKind::RedeemRequest => {
                vec![ParamType::Address, ParamType::Uint(256), ParamType::Uint(256)]
            }
            EventKind::Redeem => vec![ParamType::Uint(256); 3],
        }
    }

    /// Decodes one log against this schema. Topic 0, topic count and data layout
    /// must all match.
    pub fn decode(&self, log: &ChainLog) -> ChainResult<EventRecord> {
        let mismatch = |why: &str| ChainError::DecodeMismatch(format!("{}: {}", self.name(), why));

        let indexed = self.indexed_types();
        if log.topics.first() != Some(&self.topic0()) {
            return Err(mismatch("topic0 differs"));
        }
        if log.topics.len() != indexed.len() + 1 {
            return Err(mismatch("unexpected topic count"));
        }

        let mut fields = Vec::with_capacity(indexed.len() + 6);
        for (topic, ty) in log.topics[1..].iter().zip(indexed.iter()) {
            let mut token = decode(&[ty.clone()], topic.as_bytes()).map_err(|e| mismatch(&e.to_string()))?;
            fields.push(token.remove(0));
        }
        let data = decode(&self.data_types(), log.data.as_ref()).map_err(|e| mismatch(&e.to_string()))?;
        fields.extend(data);

        let mut it = fields.into_iter();
        let record = match self {
            EventKind::Transfer => EventRecord::Transfer(TransferEvent {
                from: take_address(&mut it)?,
                to: take_address(&mut it)?,
                value: take_uint(&mut it)?,
            }),
            EventKind::FlipResult => {
                let player = take_address(&mut it)?;
                let raw_choice = take_uint(&mut it)?;
                let choice = CoinSide::from_u8(raw_choice.low_u32() as u8)
                    .filter(|_| raw_choice <= U256::from(1u8))
                    .ok_or_else(|| mismatch("choice out of range"))?;
                EventRecord::FlipResult(FlipResultEvent {
                    player,
                    choice,
                    result: take_bool(&mut it)?,
                    won: take_bool(&mut it)?,
                    amount: take_uint(&mut it)?,
                    bet: take_uint(&mut it)?,
                    request_id: take_bytes32(&mut it)?,
                })
            }
            EventKind::Deposit => EventRecord::Deposit(DepositEvent {
                sender: take_address(&mut it)?,
                owner: take_address(&mut it)?,
                assets: take_uint(&mut it)?,
                shares: take_uint(&mut it)?,
            }),
            EventKind::RedeemRequest => EventRecord::RedeemRequest(RedeemRequestEvent {
                controller: take_address(&mut it)?,
                owner: take_address(&mut it)?,
                request_id: take_uint(&mut it)?,
                sender: take_address(&mut it)?,
                shares: take_uint(&mut it)?,
                assets: take_uint(&mut it)?,
            }),
            EventKind::Redeem => EventRecord::Redeem(RedeemEvent {
                controller: take_address(&mut it)?,
                receiver: take_address(&mut it)?,
                request_id: take_uint(&mut it)?,
                shares: take_uint(&mut it)?,
                assets: take_uint(&mut it)?,
                fee: take_uint(&mut it)?,
            }),
        };
        Ok(record)
    }
}

fn field_error() -> ChainError {
    ChainError::DecodeMismatch("field type mismatch".to_string())
}

fn take_address(it: &mut impl Iterator<Item = Token>) -> ChainResult<Address> {
    it.next().and_then(Token::into_address).ok_or_else(field_error)
}

fn take_uint(it: &mut impl Iterator<Item = Token>) -> ChainResult<U256> {
    it.next().and_then(Token::into_uint).ok_or_else(field_error)
}

fn take_bool(it: &mut impl Iterator<Item = Token>) -> ChainResult<bool> {
    it.next().and_then(Token::into_bool).ok_or_else(field_error)
}

fn take_bytes32(it: &mut impl Iterator<Item = Token>) -> ChainResult<H256> {
    it.next()
        .and_then(Token::into_fixed_bytes)
        .filter(|b| b.len() == 32)
        .map(|b| H256::from_slice(&b))
        .ok_or_else(field_error)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlipResultEvent {
    pub player: Address,
    pub choice: CoinSide,
    pub result: bool,
    pub won: bool,
    /// Payout in wei; meaningful when `won` is set.
    pub amount: U256,
    pub bet: U256,
    pub request_id: H256,
}

impl FlipResultEvent {
    pub fn outcome(&self) -> CoinSide {
        if self.won {
            self.choice
        } else {
            self.choice.opposite()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositEvent {
    pub sender: Address,
    pub owner: Address,
    pub assets: U256,
    pub shares: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeemRequestEvent {
    pub controller: Address,
    pub owner: Address,
    pub request_id: U256,
    pub sender: Address,
    pub shares: U256,
    pub assets: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeemEvent {
    pub controller: Address,
    pub receiver: Address,
    pub request_id: U256,
    pub shares: U256,
    pub assets: U256,
    pub fee: U256,
}

/// A decoded log, tagged by schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum EventRecord {
    Transfer(TransferEvent),
    FlipResult(FlipResultEvent),
    Deposit(DepositEvent),
    RedeemRequest(RedeemRequestEvent),
    Redeem(RedeemEvent),
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        match self {
            EventRecord::Transfer(_) => EventKind::Transfer,
            EventRecord::FlipResult(_) => EventKind::FlipResult,
            EventRecord::Deposit(_) => EventKind::Deposit,
            EventRecord::RedeemRequest(_) => EventKind::RedeemRequest,
            EventRecord::Redeem(_) => EventKind::Redeem,
        }
    }
}

/// Left-pads an address into a 32-byte topic.
pub fn address_topic(address: Address) -> H256 {
    H256::from(address)
}

pub fn uint_topic(value: U256) -> H256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    H256::from(buf)
}

/// Builds a log carrying `event` for tests and fixtures.
#[cfg(test)]
pub(crate) fn encode_log(
    address: Address,
    kind: EventKind,
    indexed: Vec<H256>,
    data: Vec<Token>,
) -> ChainLog {
    let mut topics = vec![kind.topic0()];
    topics.extend(indexed);
    ChainLog {
        address,
        topics,
        data: Bytes::from(encode(&data)),
        block_number: None,
        transaction_hash: None,
    }
}
