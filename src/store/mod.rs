//! Persistence contracts and the SQLite-backed implementation used by the
//! default deployment.

mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::lifecycle::Signal;
use crate::outcome::Horizon;
use crate::ranking::{Bucket, Ranking};
use crate::rules::SignalKey;
use crate::snapshot::{Snapshot, Window};

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, snapshot: &Snapshot) -> Result<(), EngineError>;
    async fn get_latest(&self, window: Window) -> Result<Option<Snapshot>, EngineError>;
    async fn list(&self, window: Window, limit: usize) -> Result<Vec<Snapshot>, EngineError>;
    async fn get_by_id(&self, snapshot_id: &str) -> Result<Option<Snapshot>, EngineError>;
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn find_active_by_window(&self, window: Window) -> Result<HashMap<SignalKey, Signal>, EngineError>;
    /// Atomic compare-and-set on lifecycle fields; retried once by the
    /// caller on `EngineError::StoreConflict`.
    async fn upsert_by_key(&self, signal: &Signal) -> Result<(), EngineError>;
    async fn find_pending_for_outcome(&self, horizon: Horizon) -> Result<Vec<Signal>, EngineError>;
}

#[async_trait]
pub trait RankingStore: Send + Sync {
    async fn bulk_upsert(&self, rankings: &[Ranking]) -> Result<(), EngineError>;
    async fn read_by_bucket(&self, bucket: Bucket, limit: usize) -> Result<Vec<Ranking>, EngineError>;
}

/// Run-level bookkeeping written exactly once per engine run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub window: Window,
    pub snapshot_id: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: RunStatus,
    pub created: u32,
    pub updated: u32,
    pub archived: u32,
    pub errors: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}
