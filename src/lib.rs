// src/lib.rs

use std::sync::Arc;

use blockchain::{HttpTransport, MonadClient, RpcTransport};

// Re-export commonly used types
pub use ethers_core::types::{Address, H256, U256, U64};

pub mod api;
pub mod blockchain;
pub mod config;
pub mod mcp;
pub mod utils;

/// Application state shared across all request handlers
pub struct AppState<T = HttpTransport> {
    /// Engine bound to the configured RPC pool and signing wallet
    pub client: Arc<MonadClient<T>>,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<T: RpcTransport> AppState<T> {
    pub fn new(client: MonadClient<T>) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}
