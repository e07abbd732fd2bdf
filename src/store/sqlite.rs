use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::debug;

use crate::error::EngineError;
use crate::lifecycle::Signal;
use crate::outcome::Horizon;
use crate::ranking::{Bucket, Ranking};
use crate::rules::SignalKey;
use crate::snapshot::{Snapshot, Window};

use super::{RankingStore, RunRecord, RunStatus, SignalStore, SnapshotStore};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -32000;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id TEXT PRIMARY KEY,
    window TEXT NOT NULL,
    built_at TEXT NOT NULL,
    body_json TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_snapshots_window_built
    ON snapshots(window, built_at DESC);

CREATE TABLE IF NOT EXISTS signals (
    signal_key TEXT PRIMARY KEY,
    window TEXT NOT NULL,
    state TEXT NOT NULL,
    last_triggered_at TEXT NOT NULL,
    body_json TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_signals_window_state
    ON signals(window, state);

CREATE TABLE IF NOT EXISTS rankings (
    entity_addr TEXT NOT NULL,
    chain_id TEXT NOT NULL,
    bucket TEXT NOT NULL,
    composite_score REAL NOT NULL,
    updated_at TEXT NOT NULL,
    body_json TEXT NOT NULL,
    PRIMARY KEY (entity_addr, chain_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_rankings_bucket
    ON rankings(bucket, composite_score DESC);

CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    window TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    body_json TEXT NOT NULL
) WITHOUT ROWID;
"#;

/// Single-file SQLite store behind one connection guarded by a `parking_lot`
/// mutex. All reads and writes round-trip through JSON columns rather than a
/// fully normalized schema: the engine's domain types already carry their own
/// versioned serde shape, so the blob is the source of truth and the
/// indexed columns exist purely to keep common lookups (by window, by
/// bucket, by state) off a full table scan.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(db_path: &str) -> Result<Self, EngineError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)
            .map_err(|e| EngineError::Fatal(format!("open sqlite store: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| EngineError::Fatal(format!("apply schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::Fatal(format!("open in-memory sqlite store: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| EngineError::Fatal(format!("apply schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Writes the run record exactly once; callers insert it at run start
    /// with `status = Running` and update it in place once the run finishes.
    pub fn write_run_record(&self, record: &RunRecord) -> Result<(), EngineError> {
        let status = match record.status {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        let body = serde_json::json!({
            "created": record.created,
            "updated": record.updated,
            "archived": record.archived,
            "errors": record.errors,
            "error": record.error,
        })
        .to_string();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO runs (run_id, window, started_at, completed_at, status, body_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(run_id) DO UPDATE SET
               completed_at = excluded.completed_at,
               status = excluded.status,
               body_json = excluded.body_json",
            params![
                record.run_id,
                record.window.as_str(),
                record.started_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
                status,
                body
            ],
        )
        .map_err(|e| EngineError::Fatal(format!("write run record {}: {e}", record.run_id)))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn put(&self, snapshot: &Snapshot) -> Result<(), EngineError> {
        let body = serde_json::to_string(snapshot)
            .map_err(|e| EngineError::Fatal(format!("serialize snapshot: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO snapshots (snapshot_id, window, built_at, body_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(snapshot_id) DO UPDATE SET body_json = excluded.body_json",
            params![
                snapshot.snapshot_id.0,
                snapshot.window.as_str(),
                snapshot.built_at.to_rfc3339(),
                body
            ],
        )
        .map_err(|e| EngineError::StoreConflict(format!("put snapshot: {e}")))?;
        debug!(snapshot_id = %snapshot.snapshot_id, "snapshot persisted");
        Ok(())
    }

    async fn get_latest(&self, window: Window) -> Result<Option<Snapshot>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT body_json FROM snapshots WHERE window = ?1 ORDER BY built_at DESC LIMIT 1",
            )
            .map_err(|e| EngineError::Fatal(format!("prepare get_latest: {e}")))?;
        let body: Option<String> = stmt
            .query_row(params![window.as_str()], |row| row.get(0))
            .ok();
        body.map(|b| {
            serde_json::from_str(&b).map_err(|e| EngineError::Fatal(format!("decode snapshot: {e}")))
        })
        .transpose()
    }

    async fn list(&self, window: Window, limit: usize) -> Result<Vec<Snapshot>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT body_json FROM snapshots WHERE window = ?1 ORDER BY built_at DESC LIMIT ?2",
            )
            .map_err(|e| EngineError::Fatal(format!("prepare list: {e}")))?;
        let rows = stmt
            .query_map(params![window.as_str(), limit as i64], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| EngineError::Fatal(format!("query list: {e}")))?;
        let mut out = Vec::new();
        for row in rows {
            let body = row.map_err(|e| EngineError::Fatal(format!("row: {e}")))?;
            out.push(
                serde_json::from_str(&body)
                    .map_err(|e| EngineError::Fatal(format!("decode snapshot: {e}")))?,
            );
        }
        Ok(out)
    }

    async fn get_by_id(&self, snapshot_id: &str) -> Result<Option<Snapshot>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT body_json FROM snapshots WHERE snapshot_id = ?1")
            .map_err(|e| EngineError::Fatal(format!("prepare get_by_id: {e}")))?;
        let body: Option<String> = stmt.query_row(params![snapshot_id], |row| row.get(0)).ok();
        body.map(|b| {
            serde_json::from_str(&b).map_err(|e| EngineError::Fatal(format!("decode snapshot: {e}")))
        })
        .transpose()
    }
}

#[async_trait]
impl SignalStore for SqliteStore {
    async fn find_active_by_window(&self, window: Window) -> Result<HashMap<SignalKey, Signal>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT signal_key, body_json FROM signals WHERE window = ?1 AND state != 'resolved'",
            )
            .map_err(|e| EngineError::Fatal(format!("prepare find_active_by_window: {e}")))?;
        let rows = stmt
            .query_map(params![window.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| EngineError::Fatal(format!("query find_active_by_window: {e}")))?;
        let mut out = HashMap::new();
        for row in rows {
            let (key, body) = row.map_err(|e| EngineError::Fatal(format!("row: {e}")))?;
            let signal: Signal = serde_json::from_str(&body)
                .map_err(|e| EngineError::Fatal(format!("decode signal: {e}")))?;
            out.insert(SignalKey(key), signal);
        }
        Ok(out)
    }

    async fn upsert_by_key(&self, signal: &Signal) -> Result<(), EngineError> {
        let body = serde_json::to_string(signal)
            .map_err(|e| EngineError::Fatal(format!("serialize signal: {e}")))?;
        let state = format!("{:?}", signal.state).to_lowercase();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO signals (signal_key, window, state, last_triggered_at, body_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(signal_key) DO UPDATE SET
               state = excluded.state,
               last_triggered_at = excluded.last_triggered_at,
               body_json = excluded.body_json",
            params![
                signal.signal_key.0,
                signal.window.as_str(),
                state,
                signal.last_triggered_at.to_rfc3339(),
                body
            ],
        )
        .map_err(|e| EngineError::StoreConflict(format!("upsert signal {}: {e}", signal.signal_key)))?;
        Ok(())
    }

    async fn find_pending_for_outcome(&self, _horizon: Horizon) -> Result<Vec<Signal>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT body_json FROM signals WHERE state = 'active'")
            .map_err(|e| EngineError::Fatal(format!("prepare find_pending_for_outcome: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| EngineError::Fatal(format!("query find_pending_for_outcome: {e}")))?;
        let mut out = Vec::new();
        for row in rows {
            let body = row.map_err(|e| EngineError::Fatal(format!("row: {e}")))?;
            out.push(
                serde_json::from_str(&body)
                    .map_err(|e| EngineError::Fatal(format!("decode signal: {e}")))?,
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl RankingStore for SqliteStore {
    async fn bulk_upsert(&self, rankings: &[Ranking]) -> Result<(), EngineError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| EngineError::Fatal(format!("begin bulk_upsert: {e}")))?;
        for ranking in rankings {
            let body = serde_json::to_string(ranking)
                .map_err(|e| EngineError::Fatal(format!("serialize ranking: {e}")))?;
            let bucket = format!("{:?}", ranking.bucket).to_lowercase();
            tx.execute(
                "INSERT INTO rankings (entity_addr, chain_id, bucket, composite_score, updated_at, body_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(entity_addr, chain_id) DO UPDATE SET
                   bucket = excluded.bucket,
                   composite_score = excluded.composite_score,
                   updated_at = excluded.updated_at,
                   body_json = excluded.body_json",
                params![
                    ranking.entity_addr,
                    ranking.chain_id,
                    bucket,
                    ranking.composite_score,
                    chrono::Utc::now().to_rfc3339(),
                    body
                ],
            )
            .map_err(|e| EngineError::StoreConflict(format!("upsert ranking {}: {e}", ranking.entity_addr)))?;
        }
        tx.commit()
            .map_err(|e| EngineError::Fatal(format!("commit bulk_upsert: {e}")))?;
        Ok(())
    }

    async fn read_by_bucket(&self, bucket: Bucket, limit: usize) -> Result<Vec<Ranking>, EngineError> {
        let bucket_str = format!("{bucket:?}").to_lowercase();
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT body_json FROM rankings WHERE bucket = ?1 ORDER BY composite_score DESC LIMIT ?2",
            )
            .map_err(|e| EngineError::Fatal(format!("prepare read_by_bucket: {e}")))?;
        let rows = stmt
            .query_map(params![bucket_str, limit as i64], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| EngineError::Fatal(format!("query read_by_bucket: {e}")))?;
        let mut out = Vec::new();
        for row in rows {
            let body = row.map_err(|e| EngineError::Fatal(format!("row: {e}")))?;
            out.push(
                serde_json::from_str(&body)
                    .map_err(|e| EngineError::Fatal(format!("decode ranking: {e}")))?,
            );
        }
        Ok(out)
    }
}
