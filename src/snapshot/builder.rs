use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::transfer::{Attribution, EdgeKind as TransferEdgeKind, Transfer, TransferSource};

use super::{
    compute_snapshot_id, Actor, ActorType, ClusterInput, Coverage, Edge, EdgeKey, EdgeType,
    ParticipationTrend, Snapshot, SnapshotId, Window,
};

/// Static facts about an actor that transfers alone don't carry: its type
/// and pre-typed cluster membership. A real deployment sources this from an
/// actor-labeling service; tests and standalone runs can pass an empty
/// registry and everything defaults to `Trader` with no cluster membership.
#[derive(Debug, Clone, Default)]
pub struct ActorRegistry {
    entries: HashMap<String, (ActorType, ClusterInput)>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, actor_id: impl Into<String>, actor_type: ActorType, cluster: ClusterInput) {
        self.entries.insert(actor_id.into(), (actor_type, cluster));
    }

    fn lookup(&self, actor_id: &str) -> (ActorType, ClusterInput) {
        self.entries
            .get(actor_id)
            .cloned()
            .unwrap_or((ActorType::Trader, ClusterInput::default()))
    }
}

#[derive(Default)]
struct ActorAccum {
    inflow_usd: f64,
    outflow_usd: f64,
    tx_count: u64,
    counterparties: HashSet<String>,
    strong_endpoints: u64,
    total_endpoints: u64,
    prior_tx_count: Option<u64>,
}

#[derive(Default)]
struct EdgeAccum {
    evidence_count: u64,
    total_usd: f64,
    strong_pairs: u64,
    total_pairs: u64,
    is_bridge: bool,
    timestamps: Vec<DateTime<Utc>>,
}

pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds a windowed actor/edge snapshot from raw transfers. Fails with
    /// `EngineError::InputMissing` ("SnapshotUnavailable") if the transfer
    /// store cannot be reached; no partial snapshot is ever returned.
    pub async fn build(
        &self,
        source: &dyn TransferSource,
        chain: &str,
        window: Window,
        now: DateTime<Utc>,
        registry: &ActorRegistry,
        previous: Option<&Snapshot>,
    ) -> Result<Snapshot, EngineError> {
        let window_start = now - window.duration();
        let transfers = source.list(chain, window_start, now).await.map_err(|e| {
            EngineError::InputMissing(format!("SnapshotUnavailable: {e}"))
        })?;

        let mut actor_accum: HashMap<String, ActorAccum> = HashMap::new();
        let mut edge_accum: HashMap<EdgeKey, EdgeAccum> = HashMap::new();

        let mut total_flow_usd = 0.0;
        let mut strong_transfers = 0u64;

        for t in &transfers {
            total_flow_usd += t.amount_usd;

            let from_strong = t.from.attribution.is_strong();
            let to_strong = t.to.attribution.is_strong();
            if from_strong && to_strong {
                strong_transfers += 1;
            }

            let from_acc = actor_accum.entry(t.from.actor_id.clone()).or_default();
            from_acc.outflow_usd += t.amount_usd;
            from_acc.tx_count += 1;
            from_acc.counterparties.insert(t.to.actor_id.clone());
            from_acc.total_endpoints += 1;
            if from_strong {
                from_acc.strong_endpoints += 1;
            }

            let to_acc = actor_accum.entry(t.to.actor_id.clone()).or_default();
            to_acc.inflow_usd += t.amount_usd;
            to_acc.tx_count += 1;
            to_acc.counterparties.insert(t.from.actor_id.clone());
            to_acc.total_endpoints += 1;
            if to_strong {
                to_acc.strong_endpoints += 1;
            }

            let key = EdgeKey::new(&t.from.actor_id, &t.to.actor_id);
            let edge = edge_accum.entry(key).or_default();
            edge.evidence_count += 1;
            edge.total_usd += t.amount_usd;
            edge.total_pairs += 1;
            if from_strong && to_strong {
                edge.strong_pairs += 1;
            }
            if matches!(t.edge_type, TransferEdgeKind::Bridge) {
                edge.is_bridge = true;
            }
            edge.timestamps.push(t.timestamp);
        }

        let actors: Vec<Actor> = actor_accum
            .into_iter()
            .map(|(actor_id, acc)| {
                let (actor_type, cluster) = registry.lookup(&actor_id);
                let net_flow_usd = acc.inflow_usd - acc.outflow_usd;
                let flow_share = if total_flow_usd > 0.0 {
                    (acc.inflow_usd + acc.outflow_usd) / (2.0 * total_flow_usd)
                } else {
                    0.0
                };
                let coverage = if acc.total_endpoints > 0 {
                    acc.strong_endpoints as f64 / acc.total_endpoints as f64
                } else {
                    0.0
                };
                let prior_tx_count = previous
                    .and_then(|p| p.actor(&actor_id))
                    .map(|a| a.tx_count);
                let participation_trend = classify_trend(acc.tx_count, prior_tx_count);

                Actor {
                    actor_id,
                    actor_type,
                    coverage,
                    inflow_usd: acc.inflow_usd,
                    outflow_usd: acc.outflow_usd,
                    net_flow_usd,
                    tx_count: acc.tx_count,
                    counterparty_count: acc.counterparties.len() as u64,
                    flow_share,
                    participation_trend,
                    cluster,
                }
            })
            .collect();

        let window_secs = window.duration().num_seconds().max(1) as f64;
        let edges: Vec<Edge> = edge_accum
            .into_iter()
            .map(|(key, acc)| {
                let weight = clamp01(
                    0.5 * norm(acc.evidence_count as f64, 50.0)
                        + 0.5 * norm(acc.total_usd, 1_000_000.0),
                );
                let confidence = if acc.total_pairs > 0 {
                    acc.strong_pairs as f64 / acc.total_pairs as f64
                } else {
                    0.0
                };
                let avg_coverage = confidence;
                let temporal_sync = temporal_sync_of(&acc.timestamps, window_secs);
                Edge {
                    key,
                    evidence_count: acc.evidence_count,
                    weight,
                    confidence,
                    edge_type: if acc.is_bridge {
                        EdgeType::Bridge
                    } else {
                        EdgeType::Transfer
                    },
                    avg_coverage,
                    temporal_sync,
                }
            })
            .collect();

        let actors_coverage_pct = if transfers.is_empty() {
            0.0
        } else {
            100.0 * strong_transfers as f64 / transfers.len() as f64
        };

        let snapshot_id = compute_snapshot_id(window, &actors, &edges);

        Ok(Snapshot {
            snapshot_id: SnapshotId(snapshot_id),
            window,
            built_at: now,
            actors,
            edges,
            coverage: Coverage { actors_coverage_pct },
        })
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_trend(current: u64, prior: Option<u64>) -> ParticipationTrend {
    match prior {
        None => ParticipationTrend::Stable,
        Some(0) if current > 0 => ParticipationTrend::Increasing,
        Some(prior) => {
            let ratio = current as f64 / prior as f64;
            if ratio >= 1.2 {
                ParticipationTrend::Increasing
            } else if ratio <= 0.8 {
                ParticipationTrend::Decreasing
            } else {
                ParticipationTrend::Stable
            }
        }
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn norm(v: f64, scale: f64) -> f64 {
    clamp01(v / scale)
}

fn temporal_sync_of(timestamps: &[DateTime<Utc>], window_secs: f64) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }
    let min = timestamps.iter().min().unwrap();
    let max = timestamps.iter().max().unwrap();
    let spread_secs = (*max - *min).num_seconds().max(0) as f64;
    clamp01(1.0 - spread_secs / window_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{Attribution, InMemoryTransferSource, TransferEndpoint};

    fn endpoint(id: &str, attribution: Attribution) -> TransferEndpoint {
        TransferEndpoint {
            actor_id: id.to_string(),
            attribution,
        }
    }

    fn transfer(from: &str, to: &str, amount_usd: f64, when: DateTime<Utc>) -> Transfer {
        Transfer {
            chain: "eth".to_string(),
            tx_hash: format!("0x{}{}", from, to),
            log_index: 0,
            from: endpoint(from, Attribution::Verified),
            to: endpoint(to, Attribution::Verified),
            asset_address: "0xtoken".to_string(),
            amount_raw: 1,
            amount_usd,
            timestamp: when,
            edge_type: TransferEdgeKind::Transfer,
        }
    }

    #[tokio::test]
    async fn builds_symmetric_edge_and_coverage() {
        let source = InMemoryTransferSource::new();
        let now = Utc::now();
        source.push(transfer("a", "b", 100.0, now - chrono::Duration::minutes(5)));
        source.push(transfer("a", "b", 200.0, now - chrono::Duration::minutes(3)));

        let builder = SnapshotBuilder::new();
        let registry = ActorRegistry::new();
        let snap = builder
            .build(&source, "eth", Window::H1, now, &registry, None)
            .await
            .unwrap();

        assert_eq!(snap.actors.len(), 2);
        assert_eq!(snap.edges.len(), 1);
        assert_eq!(snap.edges[0].evidence_count, 2);
        assert_eq!(snap.coverage.actors_coverage_pct, 100.0);
    }

    #[tokio::test]
    async fn identical_input_yields_identical_id() {
        let now = Utc::now();
        let source1 = InMemoryTransferSource::new();
        source1.push(transfer("a", "b", 100.0, now - chrono::Duration::minutes(5)));
        let source2 = InMemoryTransferSource::new();
        source2.push(transfer("a", "b", 100.0, now - chrono::Duration::minutes(5)));

        let builder = SnapshotBuilder::new();
        let registry = ActorRegistry::new();
        let snap1 = builder
            .build(&source1, "eth", Window::H1, now, &registry, None)
            .await
            .unwrap();
        let snap2 = builder
            .build(&source2, "eth", Window::H1, now, &registry, None)
            .await
            .unwrap();

        assert_eq!(snap1.snapshot_id.0, snap2.snapshot_id.0);
    }
}
