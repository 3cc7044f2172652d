// src/blockchain/scanner.rs
//
// Reconstructs event history for contracts without an index by scanning a
// bounded window of recent blocks. Older events are intentionally out of view.

use ethers_core::types::{Address, H256};
use serde::Serialize;
use tracing::{debug, info};

use crate::blockchain::abi::EventKind;
use crate::blockchain::error::ChainResult;
use crate::blockchain::events::{decode_log, DecodedEvent};
use crate::blockchain::models::LogFilter;
use crate::blockchain::reader::ChainReader;
use crate::blockchain::rpc_pool::RpcTransport;

pub const DEFAULT_LOG_WINDOW: u64 = 1000;

/// First block of a `window`-block scan ending at `head`.
pub fn scan_start(head: u64, window: u64) -> u64 {
    head.saturating_sub(window)
}

/// What to scan for. `indexed` pins topic position `n + 1` to a value, so the
/// participant filter is evaluated by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub event: EventKind,
    pub indexed: Vec<(usize, H256)>,
    pub limit: usize,
}

impl LogQuery {
    pub fn new(address: Address, event: EventKind, limit: usize) -> Self {
        Self {
            address,
            event,
            indexed: Vec::new(),
            limit,
        }
    }

    /// Filters on the indexed parameter at `position` (0 = first indexed field).
    pub fn with_indexed(mut self, position: usize, value: H256) -> Self {
        self.indexed.push((position, value));
        self
    }

    fn topics(&self) -> Vec<Option<H256>> {
        let width = self.indexed.iter().map(|(p, _)| p + 2).max().unwrap_or(1);
        let mut topics = vec![None; width];
        topics[0] = Some(self.event.topic0());
        for (position, value) in &self.indexed {
            topics[position + 1] = Some(*value);
        }
        topics
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub from_block: u64,
    pub to_block: u64,
    /// Logs returned by the node before truncation.
    pub matched: usize,
    /// Decoded events, newest first.
    pub events: Vec<DecodedEvent>,
}

pub struct HistoricalLogScanner<T> {
    reader: ChainReader<T>,
    window: u64,
}

impl<T> Clone for HistoricalLogScanner<T> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            window: self.window,
        }
    }
}

impl<T: RpcTransport> HistoricalLogScanner<T> {
    pub fn new(reader: ChainReader<T>, window: u64) -> Self {
        Self { reader, window }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    pub async fn scan(&self, query: &LogQuery) -> ChainResult<ScanResult> {
        let head = self.reader.block_number().await?;
        let from_block = scan_start(head, self.window);
        let filter = LogFilter {
            address: query.address,
            from_block,
            to_block: head,
            topics: query.topics(),
        };

        let mut logs = self.reader.logs(&filter).await?;
        let matched = logs.len();

        // keep the most recent `limit`, truncating before any decoding
        if logs.len() > query.limit {
            logs.drain(..logs.len() - query.limit);
        }
        logs.reverse();

        let events: Vec<DecodedEvent> = logs
            .iter()
            .filter_map(|log| decode_log(log, query.event))
            .collect();
        if events.len() < logs.len() {
            debug!(
                "Dropped {} undecodable {} log(s)",
                logs.len() - events.len(),
                query.event.name()
            );
        }

        info!(
            "Scanned {} on {:?} over blocks {}..{}: {} matched, {} kept",
            query.event.name(),
            query.address,
            from_block,
            head,
            matched,
            events.len()
        );

        Ok(ScanResult {
            from_block,
            to_block: head,
            matched,
            events,
        })
    }
}
