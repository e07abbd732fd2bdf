//! Content-addressing for snapshots.
//!
//! Canonicalize (sort, scale floats to fixed-point), then hash with a
//! stable, documented 64-bit digest. 64 bits is an acceptable collision
//! budget for a dedup key; this id is never used as a security boundary.

use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use super::{Actor, Edge, Window};

const USD_SCALE: f64 = 100.0;

fn scaled(amount: f64) -> i64 {
    (amount * USD_SCALE).round() as i64
}

/// Deterministic id for a snapshot: identical actor/edge aggregates in the
/// same window always hash to the same id, regardless of build order.
pub fn compute_snapshot_id(window: Window, actors: &[Actor], edges: &[Edge]) -> String {
    let mut hasher = DefaultHasher::new();
    "SNAPFP_V1".hash(&mut hasher);
    window.as_str().hash(&mut hasher);

    let mut actor_ids: Vec<&Actor> = actors.iter().collect();
    actor_ids.sort_by(|a, b| a.actor_id.cmp(&b.actor_id));
    for actor in actor_ids {
        actor.actor_id.hash(&mut hasher);
        scaled(actor.inflow_usd).hash(&mut hasher);
        scaled(actor.outflow_usd).hash(&mut hasher);
        scaled(actor.net_flow_usd).hash(&mut hasher);
        actor.tx_count.hash(&mut hasher);
        actor.counterparty_count.hash(&mut hasher);
    }

    let mut edge_keys: Vec<&Edge> = edges.iter().collect();
    edge_keys.sort_by(|a, b| a.key.0.cmp(&b.key.0).then(a.key.1.cmp(&b.key.1)));
    for edge in edge_keys {
        edge.key.0.hash(&mut hasher);
        edge.key.1.hash(&mut hasher);
        edge.evidence_count.hash(&mut hasher);
        scaled(edge.weight * 1000.0).hash(&mut hasher);
    }

    format!("{:016x}", hasher.finish())
}
