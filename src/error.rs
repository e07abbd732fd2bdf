//! Error taxonomy for the signal pipeline (kinds, not call-site specifics).
//!
//! Recoverable kinds are absorbed at the run boundary and folded into a
//! `RunRecord`'s stats; only `Fatal` aborts a run and prevents further
//! writes for that run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Upstream data unavailable (no snapshot, no transfers). Run marked `failed`.
    #[error("input missing: {0}")]
    InputMissing(String),

    /// Soft quality gate failed (e.g. coverage below floor). Recorded as a reason, not raised.
    #[error("gate failed: {0}")]
    GateFailed(String),

    /// A single detector crashed; other detectors continue.
    #[error("detector {detector} failed: {source}")]
    DetectorError {
        detector: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Concurrent write on the same key; caller retries upsert once.
    #[error("store conflict on key {0}")]
    StoreConflict(String),

    /// Signal persisted but dispatch failed; signal stays ACTIVE.
    #[error("dispatch failed: {0}")]
    DispatcherError(String),

    /// Admin write rejected by the freeze invariant.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Store unreachable or an invariant broke. Aborts the run with no further writes.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    /// `Fatal` is the only kind that aborts a run; everything else is absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_))
    }
}
