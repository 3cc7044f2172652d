// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ethers_core::types::Address;
use secrecy::SecretString;
use url::Url;

pub const DEFAULT_RPC_URL: &str = "https://testnet-rpc.monad.xyz";
pub const DEFAULT_APRMON_CONTRACT: &str = "0xb2f82D0f38dc453D596Ad40A37799446Cc89274A";

// A struct to hold all configuration, loaded once at startup from the .env file.
#[derive(Debug)]
pub struct Config {
    // Server settings
    pub port: u16,

    /// Monad testnet JSON-RPC endpoints, in fallback order.
    pub rpc_urls: Vec<String>,
    /// How many endpoints must agree on a read or accept a broadcast.
    pub rpc_quorum: usize,
    pub rpc_timeout: Duration,

    // Signing credential
    pub private_key: SecretString,

    // Transaction lifecycle
    pub log_scan_window: u64,
    pub receipt_poll_interval: Duration,
    /// `None` waits for inclusion indefinitely.
    pub confirmation_timeout: Option<Duration>,

    // Contracts
    pub coinflip_contract: Option<Address>,
    pub aprmon_contract: Option<Address>,
}

/// Reads `key`, falling back to `default`, and parses it.
fn parse_var<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<T>()
        .with_context(|| format!("{} must be a valid number", key))
}

/// Parses a duration-like setting that must be at least 1.
fn positive(key: &str, raw: &str) -> Result<u64> {
    let value: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a valid number", key))?;
    if value == 0 {
        return Err(anyhow!("{} must be at least 1", key));
    }
    Ok(value)
}

fn positive_var(key: &str, default: &str) -> Result<u64> {
    positive(key, &env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn optional_address(key: &str, default: Option<&str>) -> Result<Option<Address>> {
    let raw = match env::var(key) {
        Ok(v) if v.trim().is_empty() => return Ok(None),
        Ok(v) => v,
        Err(_) => match default {
            Some(d) => d.to_string(),
            None => return Ok(None),
        },
    };
    let address = Address::from_str(raw.trim())
        .with_context(|| format!("{} must be a 0x-prefixed 20-byte address", key))?;
    Ok(Some(address))
}

/// Splits a comma-separated endpoint list and checks every entry is an http(s) URL.
pub fn parse_rpc_urls(raw: &str) -> Result<Vec<String>> {
    let urls: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if urls.is_empty() {
        return Err(anyhow!("MONAD_RPC_URLS must list at least one endpoint"));
    }
    for url in &urls {
        let parsed = Url::parse(url).with_context(|| format!("Invalid RPC URL '{}'", url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("RPC URL '{}' must use http or https", url));
        }
    }
    Ok(urls)
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load variables from the .env file into the environment
        dotenvy::dotenv().ok();

        let rpc_urls = parse_rpc_urls(
            &env::var("MONAD_RPC_URLS").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string()),
        )?;

        let rpc_quorum: usize = parse_var("RPC_QUORUM", "1")?;
        if rpc_quorum == 0 || rpc_quorum > rpc_urls.len() {
            return Err(anyhow!(
                "RPC_QUORUM must be between 1 and {} (the number of endpoints), got {}",
                rpc_urls.len(),
                rpc_quorum
            ));
        }

        let private_key = env::var("PRIVATE_KEY")
            .context("PRIVATE_KEY must be set to the signing key of the server wallet")?;

        let confirmation_timeout = match env::var("CONFIRMATION_TIMEOUT_SECS") {
            Ok(v) if !v.trim().is_empty() => {
                Some(Duration::from_secs(positive("CONFIRMATION_TIMEOUT_SECS", &v)?))
            }
            _ => None,
        };

        Ok(Config {
            port: parse_var("PORT", "8080")?,
            rpc_urls,
            rpc_quorum,
            rpc_timeout: Duration::from_secs(positive_var("RPC_TIMEOUT_SECS", "30")?),
            private_key: SecretString::new(private_key.trim().to_string()),
            log_scan_window: parse_var("LOG_SCAN_WINDOW", "1000")?,
            receipt_poll_interval: Duration::from_millis(positive_var(
                "RECEIPT_POLL_INTERVAL_MS",
                "1000",
            )?),
            confirmation_timeout,
            coinflip_contract: optional_address("COINFLIP_CONTRACT", None)?,
            aprmon_contract: optional_address("APRMON_CONTRACT", Some(DEFAULT_APRMON_CONTRACT))?,
        })
    }
}
