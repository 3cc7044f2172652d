//! Engine façade for the Monad testnet.
//!
//! `MonadClient` wires one `RpcPool` into the reader, builder, submitter and
//! scanner, and carries the signing wallet and the contract addresses the
//! tools need. It is generic over the transport so tests can run it against an
//! in-process node.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ethers_core::types::Address;
use ethers_signers::{LocalWallet, Signer};
use secrecy::ExposeSecret;
use tracing::info;

use crate::blockchain::builder::{BuiltTransaction, TransactionBuilder, TransactionIntent};
use crate::blockchain::error::{ChainError, ChainResult};
use crate::blockchain::reader::ChainReader;
use crate::blockchain::rpc_pool::{HttpTransport, RpcPool, RpcTransport};
use crate::blockchain::scanner::{HistoricalLogScanner, DEFAULT_LOG_WINDOW};
use crate::blockchain::submitter::{ConfirmedTransaction, TransactionSubmitter, WaitOptions};
use crate::config::Config;

/// Tunables that are not part of the pool itself.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub log_scan_window: u64,
    pub receipt_poll_interval: Duration,
    pub confirmation_timeout: Option<Duration>,
    pub coinflip_contract: Option<Address>,
    pub aprmon_contract: Option<Address>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            log_scan_window: DEFAULT_LOG_WINDOW,
            receipt_poll_interval: Duration::from_secs(1),
            confirmation_timeout: None,
            coinflip_contract: None,
            aprmon_contract: None,
        }
    }
}

/// Parses a hex private key, with or without the `0x` prefix.
pub fn wallet_from_key(key: &str) -> Result<LocalWallet> {
    key.trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .context("PRIVATE_KEY is not a valid secp256k1 private key")
}

pub struct MonadClient<T = HttpTransport> {
    reader: ChainReader<T>,
    builder: TransactionBuilder<T>,
    submitter: TransactionSubmitter<T>,
    scanner: HistoricalLogScanner<T>,
    coinflip_contract: Option<Address>,
    aprmon_contract: Option<Address>,
}

impl<T> Clone for MonadClient<T> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            builder: self.builder.clone(),
            submitter: self.submitter.clone(),
            scanner: self.scanner.clone(),
            coinflip_contract: self.coinflip_contract,
            aprmon_contract: self.aprmon_contract,
        }
    }
}

impl MonadClient<HttpTransport> {
    /// Builds the HTTP-backed client. Failures here are startup errors.
    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoints = config
            .rpc_urls
            .iter()
            .map(|url| HttpTransport::new(url, config.rpc_timeout))
            .collect::<Result<Vec<_>>>()?;
        let pool = RpcPool::new(endpoints, config.rpc_quorum)
            .context("Invalid RPC pool configuration")?;
        let wallet = wallet_from_key(config.private_key.expose_secret())?;

        info!(
            "RPC pool: {} endpoint(s), quorum {}",
            config.rpc_urls.len(),
            config.rpc_quorum
        );

        Ok(Self::new(
            pool,
            wallet,
            ClientSettings {
                log_scan_window: config.log_scan_window,
                receipt_poll_interval: config.receipt_poll_interval,
                confirmation_timeout: config.confirmation_timeout,
                coinflip_contract: config.coinflip_contract,
                aprmon_contract: config.aprmon_contract,
            },
        ))
    }
}

impl<T: RpcTransport> MonadClient<T> {
    pub fn new(pool: RpcPool<T>, wallet: LocalWallet, settings: ClientSettings) -> Self {
        let reader = ChainReader::new(Arc::new(pool));
        info!("Signing as {:?}", wallet.address());
        Self {
            builder: TransactionBuilder::new(reader.clone()),
            submitter: TransactionSubmitter::new(
                reader.clone(),
                wallet,
                settings.receipt_poll_interval,
                settings.confirmation_timeout,
            ),
            scanner: HistoricalLogScanner::new(reader.clone(), settings.log_scan_window),
            reader,
            coinflip_contract: settings.coinflip_contract,
            aprmon_contract: settings.aprmon_contract,
        }
    }

    pub fn reader(&self) -> &ChainReader<T> {
        &self.reader
    }

    pub fn builder(&self) -> &TransactionBuilder<T> {
        &self.builder
    }

    pub fn submitter(&self) -> &TransactionSubmitter<T> {
        &self.submitter
    }

    pub fn scanner(&self) -> &HistoricalLogScanner<T> {
        &self.scanner
    }

    /// Address of the configured signer.
    pub fn wallet_address(&self) -> Address {
        self.submitter.address()
    }

    pub fn coinflip_contract(&self) -> ChainResult<Address> {
        self.coinflip_contract
            .ok_or_else(|| ChainError::invalid("COINFLIP_CONTRACT is not configured"))
    }

    pub fn aprmon_contract(&self) -> ChainResult<Address> {
        self.aprmon_contract
            .ok_or_else(|| ChainError::invalid("APRMON_CONTRACT is not configured"))
    }

    /// Wait options for one call: an explicit timeout overrides the configured one.
    pub fn wait_options(&self, timeout: Option<Duration>) -> WaitOptions {
        let mut wait = self.submitter.default_wait();
        if timeout.is_some() {
            wait.timeout = timeout;
        }
        wait
    }

    /// Build from the signer's account, then sign, broadcast and confirm.
    pub async fn execute(
        &self,
        intent: &TransactionIntent,
        wait: WaitOptions,
    ) -> ChainResult<(BuiltTransaction, ConfirmedTransaction)> {
        let built = self.builder.build(self.wallet_address(), intent).await?;
        let confirmed = self.submitter.submit_with(&built, wait).await?;
        Ok((built, confirmed))
    }
}
