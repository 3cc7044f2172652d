// src/blockchain/services/mod.rs
pub mod balance;
pub mod chain;
pub mod coinflip;
pub mod staking;
pub mod transfer;
