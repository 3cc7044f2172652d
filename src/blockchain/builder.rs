// src/blockchain/builder.rs
//
// Turns a validated intent into a fully specified, unsigned legacy transaction.
// Order: validate -> convert units -> balance check -> estimate -> buffer -> price.
// Any failure aborts the build.

use ethers_core::types::{Address, Bytes, TransactionRequest, U256};
use serde::Serialize;
use tracing::{debug, info};

use crate::blockchain::abi::{CoinSide, ContractCall};
use crate::blockchain::error::{ChainError, ChainResult};
use crate::blockchain::reader::{CallRequest, ChainReader};
use crate::blockchain::rpc_pool::RpcTransport;
use crate::blockchain::units::{
    format_units_lossy, is_unsigned_decimal, parse_address, to_raw_units, NATIVE_DECIMALS,
    NATIVE_SYMBOL,
};

/// Applied limit = estimate * 120 / 100, rounded down.
pub const GAS_BUFFER_NUMERATOR: u64 = 120;
pub const GAS_BUFFER_DENOMINATOR: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GasParameters {
    pub estimated_limit: U256,
    pub applied_limit: U256,
    pub price: U256,
}

impl GasParameters {
    pub fn new(estimated_limit: U256, price: U256) -> Self {
        Self {
            estimated_limit,
            applied_limit: buffered_gas_limit(estimated_limit),
            price,
        }
    }

    /// Upper bound of the fee this transaction can burn.
    pub fn max_fee(&self) -> U256 {
        self.applied_limit.saturating_mul(self.price)
    }
}

pub fn buffered_gas_limit(estimated: U256) -> U256 {
    estimated.saturating_mul(U256::from(GAS_BUFFER_NUMERATOR)) / U256::from(GAS_BUFFER_DENOMINATOR)
}

/// What a transaction does. Addresses and amounts stay as user-supplied strings
/// until the builder validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Send MON to `recipient`.
    NativeTransfer,
    /// ERC-20 `transfer(recipient, amount)` on `token`.
    TokenTransfer { token: String },
    /// Wager `amount` MON on the coinflip contract at `recipient`.
    FlipCoin { choice: CoinSide },
    /// Deposit `amount` MON into the vault at `recipient`.
    VaultDeposit,
    /// Request redemption of `amount` vault shares at `recipient`.
    VaultRequestRedeem,
    /// Claim a matured redeem request; `amount` is ignored.
    VaultRedeem { request_id: U256 },
}

/// One invocation's intent. Constructed once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub kind: OperationKind,
    /// Transfer recipient, or the target contract for contract calls.
    pub recipient: String,
    /// Decimal string in human units.
    pub amount: String,
}

impl TransactionIntent {
    pub fn new(kind: OperationKind, recipient: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            kind,
            recipient: recipient.into(),
            amount: amount.into(),
        }
    }
}

/// Where the amount is denominated and whose balance bounds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Denomination {
    Native,
    Token(Address),
    None,
}

#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub from: Address,
    pub to: Address,
    /// Native value attached to the transaction.
    pub value: U256,
    /// Amount moved in the intent's own unit.
    pub amount: U256,
    pub decimals: u8,
    pub symbol: String,
    pub data: Option<Bytes>,
    pub gas: GasParameters,
}

impl BuiltTransaction {
    /// Legacy transaction request; nonce and chain id are left to the submitter.
    pub fn to_request(&self) -> TransactionRequest {
        let mut tx = TransactionRequest::new()
            .from(self.from)
            .to(self.to)
            .value(self.value)
            .gas(self.gas.applied_limit)
            .gas_price(self.gas.price);
        if let Some(data) = &self.data {
            tx = tx.data(data.clone());
        }
        tx
    }

    pub fn display_amount(&self) -> String {
        format_units_lossy(self.amount, self.decimals)
    }
}

pub struct TransactionBuilder<T> {
    reader: ChainReader<T>,
}

impl<T> Clone for TransactionBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
        }
    }
}

impl<T: RpcTransport> TransactionBuilder<T> {
    pub fn new(reader: ChainReader<T>) -> Self {
        Self { reader }
    }

    pub async fn build(&self, from: Address, intent: &TransactionIntent) -> ChainResult<BuiltTransaction> {
        // 1. validate before any network call
        let recipient = parse_address(&intent.recipient)?;
        let token = match &intent.kind {
            OperationKind::TokenTransfer { token } => Some(parse_address(token)?),
            _ => None,
        };
        let denomination = match (&intent.kind, token) {
            (OperationKind::TokenTransfer { .. }, Some(token)) => Denomination::Token(token),
            (OperationKind::VaultRequestRedeem, _) => Denomination::Token(recipient),
            (OperationKind::VaultRedeem { .. }, _) => Denomination::None,
            _ => Denomination::Native,
        };
        if denomination != Denomination::None && !is_unsigned_decimal(intent.amount.trim()) {
            return Err(ChainError::invalid(format!(
                "amount '{}' is not an unsigned decimal number",
                intent.amount
            )));
        }

        // 2. decimal string -> raw units
        let (amount, decimals, symbol) = match denomination {
            Denomination::Native => (
                to_raw_units(&intent.amount, NATIVE_DECIMALS)?,
                NATIVE_DECIMALS,
                NATIVE_SYMBOL.to_string(),
            ),
            Denomination::Token(token) => {
                let meta = self.reader.token_metadata(token).await?;
                (to_raw_units(&intent.amount, meta.decimals)?, meta.decimals, meta.symbol)
            }
            Denomination::None => (U256::zero(), NATIVE_DECIMALS, NATIVE_SYMBOL.to_string()),
        };

        // 3. balance check before spending a round trip on estimation
        let available = match denomination {
            Denomination::Native => Some(self.reader.native_balance(from).await?),
            Denomination::Token(token) => Some(self.reader.token_balance(token, from).await?),
            Denomination::None => None,
        };
        if let Some(available) = available {
            if available < amount {
                return Err(ChainError::InsufficientFunds {
                    required: format_units_lossy(amount, decimals),
                    available: format_units_lossy(available, decimals),
                    unit: symbol,
                });
            }
        }

        let (to, value, call) = match &intent.kind {
            OperationKind::NativeTransfer => (recipient, amount, None),
            OperationKind::TokenTransfer { .. } => {
                let token = token.ok_or_else(|| ChainError::invalid("token address missing"))?;
                (token, U256::zero(), Some(ContractCall::Transfer { recipient, amount }))
            }
            OperationKind::FlipCoin { choice } => {
                (recipient, amount, Some(ContractCall::FlipCoin { choice: *choice }))
            }
            OperationKind::VaultDeposit => (
                recipient,
                amount,
                Some(ContractCall::Deposit { assets: amount, receiver: from }),
            ),
            OperationKind::VaultRequestRedeem => (
                recipient,
                U256::zero(),
                Some(ContractCall::RequestRedeem { shares: amount, controller: from, owner: from }),
            ),
            OperationKind::VaultRedeem { request_id } => (
                recipient,
                U256::zero(),
                Some(ContractCall::Redeem { request_id: *request_id, receiver: from }),
            ),
        };
        if !value.is_zero() && !call.as_ref().map_or(true, ContractCall::is_payable) {
            return Err(ChainError::invalid(format!("{:?} cannot carry a MON value", intent.kind)));
        }
        let data = call.as_ref().map(ContractCall::calldata);

        // 4. estimate the exact call
        let estimate_request = CallRequest {
            from: Some(from),
            to,
            value,
            data: data.clone(),
        };
        let estimated = self.reader.estimate_gas(&estimate_request).await?;

        // 5. buffer, 6. price
        let price = self.reader.gas_price().await?;
        let gas = GasParameters::new(estimated, price);
        debug!(
            "Gas for {:?}: estimated {}, applied {}, price {}",
            intent.kind, gas.estimated_limit, gas.applied_limit, gas.price
        );
        info!(
            "Built {:?} from {:?} to {:?} ({} {})",
            intent.kind,
            from,
            to,
            format_units_lossy(amount, decimals),
            symbol
        );

        Ok(BuiltTransaction {
            from,
            to,
            value,
            amount,
            decimals,
            symbol,
            data,
            gas,
        })
    }
}
