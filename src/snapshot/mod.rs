//! Relations & snapshot layer.
//!
//! A `Snapshot` is an immutable, content-addressed projection of actors and
//! edges for one window. Two runs over identical input yield an identical
//! `SnapshotId` — sort everything, scale floats to fixed-point, then hash.

mod builder;
mod fingerprint;

pub use builder::SnapshotBuilder;
pub use fingerprint::compute_snapshot_id;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    H1,
    H24,
    D7,
    D30,
}

impl Window {
    pub fn as_str(self) -> &'static str {
        match self {
            Window::H1 => "1h",
            Window::H24 => "24h",
            Window::D7 => "7d",
            Window::D30 => "30d",
        }
    }

    pub fn duration(self) -> chrono::Duration {
        match self {
            Window::H1 => chrono::Duration::hours(1),
            Window::H24 => chrono::Duration::hours(24),
            Window::D7 => chrono::Duration::days(7),
            Window::D30 => chrono::Duration::days(30),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    Exchange,
    Protocol,
    MarketMaker,
    Infra,
    Fund,
    Trader,
}

impl ActorType {
    pub fn is_exchange_or_mm(self) -> bool {
        matches!(self, ActorType::Exchange | ActorType::MarketMaker)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipationTrend {
    Stable,
    Increasing,
    Decreasing,
}

/// Pre-typed cluster membership for an actor. Cluster inputs are required to
/// arrive pre-typed rather than inferred here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterInput {
    pub entity_id: Option<String>,
    pub owner_id: Option<String>,
    pub community_id: Option<String>,
    pub infrastructure_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub actor_id: String,
    pub actor_type: ActorType,
    pub coverage: f64,
    pub inflow_usd: f64,
    pub outflow_usd: f64,
    pub net_flow_usd: f64,
    pub tx_count: u64,
    pub counterparty_count: u64,
    pub flow_share: f64,
    pub participation_trend: ParticipationTrend,
    pub cluster: ClusterInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    Transfer,
    Bridge,
}

/// Unordered pair of actor ids, keyed by sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey(pub String, pub String);

impl EdgeKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            EdgeKey(a.to_string(), b.to_string())
        } else {
            EdgeKey(b.to_string(), a.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub key: EdgeKey,
    pub evidence_count: u64,
    pub weight: f64,
    pub confidence: f64,
    pub edge_type: EdgeType,
    pub avg_coverage: f64,
    /// Fraction of evidence arriving within a tight time window of each
    /// other; feeds the `NEW_BRIDGE` detector's `temporal_sync` gate.
    pub temporal_sync: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coverage {
    pub actors_coverage_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: SnapshotId,
    pub window: Window,
    pub built_at: DateTime<Utc>,
    pub actors: Vec<Actor>,
    pub edges: Vec<Edge>,
    pub coverage: Coverage,
}

impl Snapshot {
    pub fn actor(&self, actor_id: &str) -> Option<&Actor> {
        self.actors.iter().find(|a| a.actor_id == actor_id)
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.key == key)
    }
}
