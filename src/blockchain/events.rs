// src/blockchain/events.rs
//
// Picks the log that represents an operation's result. Rule: the first log, in
// receipt order, that decodes against the target schema. Logs from unrelated
// internal calls fail to decode and are skipped. This holds for contracts that
// emit one instance of the event per call; a contract emitting the same event
// several times per call would need matching by emitter or field values.

use ethers_core::types::{Address, H256};
use serde::Serialize;
use tracing::debug;

use crate::blockchain::abi::{EventKind, EventRecord};
use crate::blockchain::models::ChainLog;
use crate::blockchain::submitter::ConfirmedTransaction;

/// A decoded log together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedEvent {
    pub contract: Address,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<H256>,
    pub record: EventRecord,
}

/// Decodes a single log; mismatches become `None`.
pub fn decode_log(log: &ChainLog, kind: EventKind) -> Option<DecodedEvent> {
    match kind.decode(log) {
        Ok(record) => {
            debug!("Decoded {} from {:?}", record.kind().name(), log.address);
            Some(DecodedEvent {
                contract: log.address,
                block_number: log.block_number.map(|n| n.as_u64()),
                transaction_hash: log.transaction_hash,
                record,
            })
        }
        Err(e) => {
            debug!("Skipping log from {:?}: {}", log.address, e);
            None
        }
    }
}

/// First log in `logs` that decodes as `kind`.
pub fn first_match(logs: &[ChainLog], kind: EventKind) -> Option<DecodedEvent> {
    logs.iter().find_map(|log| decode_log(log, kind))
}

/// Result event of a confirmed transaction. `None` means no matching event, and
/// callers fall back to a generic description of the transaction.
pub fn result_event(confirmed: &ConfirmedTransaction, kind: EventKind) -> Option<DecodedEvent> {
    first_match(confirmed.logs(), kind)
}
