//! Deterministic detectors turning a snapshot pair into signal candidates.

mod actor_regime_change;
mod density_spike;
mod direction_imbalance;
mod engine;
mod key;
mod new_bridge;
mod new_corridor;

pub use engine::RuleEngine;
pub use key::{compute_signal_key, SignalKey};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::snapshot::{Snapshot, Window};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorKind {
    NewCorridor,
    DensitySpike,
    DirectionImbalance,
    ActorRegimeChange,
    NewBridge,
}

impl DetectorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectorKind::NewCorridor => "NEW_CORRIDOR",
            DetectorKind::DensitySpike => "DENSITY_SPIKE",
            DetectorKind::DirectionImbalance => "DIRECTION_IMBALANCE",
            DetectorKind::ActorRegimeChange => "ACTOR_REGIME_CHANGE",
            DetectorKind::NewBridge => "NEW_BRIDGE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Actor,
    Corridor,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Actor => "actor",
            Scope::Corridor => "corridor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub what: String,
    pub why_now: String,
    pub so_what: String,
}

/// A candidate is entirely ephemeral: it exists only within one engine run,
/// and is reconciled against the persistent signal store by `signal_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub kind: DetectorKind,
    pub severity: Severity,
    pub scope: Scope,
    pub window: Window,
    pub primary_actor_ids: Vec<String>,
    pub primary_edge_ids: Vec<String>,
    pub entities: Vec<String>,
    pub metrics: HashMap<String, f64>,
    pub evidence_count: u64,
    pub summary: Summary,
    pub signal_key: SignalKey,
}

/// Shared read-only context every detector receives. `previous` is `None` on
/// the first run for a window; detectors that need a comparison baseline
/// (density spike, actor regime change) must emit nothing in that case.
pub struct DetectionContext<'a> {
    pub current: &'a Snapshot,
    pub previous: Option<&'a Snapshot>,
    pub window: Window,
}

pub(crate) fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}
