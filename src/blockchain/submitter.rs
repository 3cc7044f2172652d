// src/blockchain/submitter.rs
//
// Signs a built transaction, broadcasts it through the pool and blocks until a
// receipt with a definitive status exists. A reverted receipt is a final
// outcome and is never resubmitted.

use std::time::Duration;

use ethers_core::types::{transaction::eip2718::TypedTransaction, Address, H256, U256};
use ethers_signers::{LocalWallet, Signer};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blockchain::builder::{BuiltTransaction, GasParameters};
use crate::blockchain::error::{ChainError, ChainResult};
use crate::blockchain::models::{ChainLog, ChainReceipt, ReceiptStatus};
use crate::blockchain::reader::ChainReader;
use crate::blockchain::rpc_pool::RpcTransport;

/// Bounds on the confirmation wait. Without a timeout the wait lasts until the
/// transaction is mined.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

/// A mined transaction whose receipt reports success. Only this type exposes
/// logs, so a reverted receipt can never reach event decoding.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedTransaction {
    pub hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub gas: GasParameters,
    logs: Vec<ChainLog>,
}

impl ConfirmedTransaction {
    pub fn logs(&self) -> &[ChainLog] {
        &self.logs
    }

    /// Checks the receipt status before any log is exposed.
    pub fn from_receipt(receipt: ChainReceipt, gas: GasParameters) -> ChainResult<Self> {
        if receipt.status() != ReceiptStatus::Success {
            return Err(ChainError::TransactionReverted {
                hash: receipt.transaction_hash,
            });
        }
        Ok(Self {
            hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used,
            gas,
            logs: receipt.logs,
        })
    }
}

pub struct TransactionSubmitter<T> {
    reader: ChainReader<T>,
    wallet: LocalWallet,
    poll_interval: Duration,
    default_timeout: Option<Duration>,
}

impl<T> Clone for TransactionSubmitter<T> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            wallet: self.wallet.clone(),
            poll_interval: self.poll_interval,
            default_timeout: self.default_timeout,
        }
    }
}

impl<T: RpcTransport> TransactionSubmitter<T> {
    pub fn new(
        reader: ChainReader<T>,
        wallet: LocalWallet,
        poll_interval: Duration,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            reader,
            wallet,
            poll_interval,
            default_timeout,
        }
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn default_wait(&self) -> WaitOptions {
        WaitOptions {
            timeout: self.default_timeout,
            cancel: None,
        }
    }

    pub async fn submit_with(
        &self,
        built: &BuiltTransaction,
        wait: WaitOptions,
    ) -> ChainResult<ConfirmedTransaction> {
        let hash = self.broadcast(built).await?;
        let receipt = self.wait_for_receipt(hash, &wait).await?;
        let confirmed = ConfirmedTransaction::from_receipt(receipt, built.gas);
        match &confirmed {
            Ok(c) => info!("Transaction {:?} confirmed in block {:?}", c.hash, c.block_number),
            Err(e) => warn!("{}", e),
        }
        confirmed
    }

    /// Fills nonce and chain id, signs, and hands the raw bytes to the pool.
    pub async fn broadcast(&self, built: &BuiltTransaction) -> ChainResult<H256> {
        let from = self.wallet.address();
        if built.from != from {
            return Err(ChainError::Signing(format!(
                "transaction built for {:?} but signer is {:?}",
                built.from, from
            )));
        }

        let (nonce, chain_id) =
            tokio::try_join!(self.reader.transaction_count(from), self.reader.chain_id())?;

        let tx = built.to_request().nonce(nonce).chain_id(chain_id);
        let typed: TypedTransaction = tx.into();
        let wallet = self.wallet.clone().with_chain_id(chain_id);
        let signature = wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let raw = typed.rlp_signed(&signature);

        info!(
            "Broadcasting transaction from {:?} to {:?} (nonce {}, gas {} @ {})",
            from, built.to, nonce, built.gas.applied_limit, built.gas.price
        );
        self.reader.pool().submit(&raw).await
    }

    /// Polls for the receipt. Transient pool failures while waiting are logged
    /// and polling continues; the transaction is already in flight.
    pub async fn wait_for_receipt(&self, hash: H256, wait: &WaitOptions) -> ChainResult<ChainReceipt> {
        let poll = async {
            loop {
                match self.reader.receipt(hash).await {
                    Ok(Some(receipt)) => return Ok::<_, ChainError>(receipt),
                    Ok(None) => debug!("Receipt for {:?} not available yet", hash),
                    Err(ChainError::RpcUnavailable(reason)) => {
                        warn!("Receipt poll for {:?} failed: {}", hash, reason)
                    }
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        let cancelled = async {
            match &wait.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let bounded = async {
            match wait.timeout {
                Some(limit) => match tokio::time::timeout(limit, poll).await {
                    Ok(result) => result,
                    Err(_) => Err(ChainError::Timeout {
                        hash,
                        secs: limit.as_secs(),
                    }),
                },
                None => poll.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = cancelled => Err(ChainError::Cancelled { hash }),
        }
    }
}
