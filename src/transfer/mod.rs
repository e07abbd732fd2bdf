//! Transfer ingest — the leaf of the pipeline.
//!
//! `Transfer` is append-only and assumed idempotent by `(chain, tx_hash, log_index)`.
//! The actual chain I/O is an external collaborator; this module only states
//! the contract (`TransferSource`) plus a reference in-memory implementation
//! used by tests and by any caller that doesn't need a live chain feed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub type Chain = String;

/// Attribution confidence for a transfer endpoint. Weak attributions are
/// excluded from coverage aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribution {
    Verified,
    Weak,
    Unknown,
}

impl Attribution {
    pub fn is_strong(self) -> bool {
        matches!(self, Attribution::Verified)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEndpoint {
    pub actor_id: String,
    pub attribution: Attribution,
}

/// An append-only transfer record, immutable once observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub chain: Chain,
    pub tx_hash: String,
    pub log_index: u32,
    pub from: TransferEndpoint,
    pub to: TransferEndpoint,
    pub asset_address: String,
    pub amount_raw: u128,
    pub amount_usd: f64,
    pub timestamp: DateTime<Utc>,
    pub edge_type: EdgeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Transfer,
    Bridge,
}

impl Transfer {
    /// Stable identity: `(chain, txHash, logIndex)`.
    pub fn identity(&self) -> (Chain, String, u32) {
        (self.chain.clone(), self.tx_hash.clone(), self.log_index)
    }
}

/// The consumed contract: `list(chain, from..to, timestamp window) -> Transfer[]`.
#[async_trait]
pub trait TransferSource: Send + Sync {
    async fn list(
        &self,
        chain: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Transfer>, EngineError>;
}

/// Reference in-memory source for tests and standalone runs. Idempotent on
/// `(chain, tx_hash, log_index)` — inserting the same transfer twice is a no-op.
#[derive(Default)]
pub struct InMemoryTransferSource {
    transfers: parking_lot::Mutex<Vec<Transfer>>,
}

impl InMemoryTransferSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, transfer: Transfer) {
        let mut guard = self.transfers.lock();
        let id = transfer.identity();
        if guard.iter().any(|t| t.identity() == id) {
            return;
        }
        guard.push(transfer);
    }
}

#[async_trait]
impl TransferSource for InMemoryTransferSource {
    async fn list(
        &self,
        chain: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Transfer>, EngineError> {
        let guard = self.transfers.lock();
        Ok(guard
            .iter()
            .filter(|t| {
                t.chain == chain && t.timestamp >= window_start && t.timestamp <= window_end
            })
            .cloned()
            .collect())
    }
}
