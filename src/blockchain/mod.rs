// src/blockchain/mod.rs

// Transaction lifecycle engine, leaves first
pub mod error;
pub mod rpc_pool;
pub mod units;
pub mod models;
pub mod abi;
pub mod reader;
pub mod builder;
pub mod submitter;
pub mod events;
pub mod scanner;

// Wiring and tool-level operations
pub mod client;
pub mod services;

// Re-export commonly used types
pub use client::{ClientSettings, MonadClient};
pub use error::{ChainError, ChainResult};
pub use rpc_pool::{HttpTransport, RpcPool, RpcTransport, TransportError};
