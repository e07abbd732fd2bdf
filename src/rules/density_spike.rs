use std::collections::HashMap;

use crate::config::RuleThresholds;

use super::key::compute_signal_key;
use super::{DetectionContext, DetectorKind, Scope, Severity, SignalCandidate, Summary};

/// An edge present in both snapshots whose evidence count jumped by at least
/// `minSpikeRatio` over the previous run.
pub fn detect(ctx: &DetectionContext, thresholds: &RuleThresholds) -> Vec<SignalCandidate> {
    let Some(previous) = ctx.previous else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for edge in &ctx.current.edges {
        let Some(prev_edge) = previous.edge(&edge.key) else {
            continue;
        };
        if prev_edge.evidence_count < thresholds.min_prev_density {
            continue;
        }
        let prev = prev_edge.evidence_count as f64;
        let curr = edge.evidence_count as f64;
        let spike_ratio = (curr - prev) / prev.max(1.0);
        if spike_ratio < thresholds.min_spike_ratio || edge.avg_coverage < thresholds.coverage_required
        {
            continue;
        }

        let severity = if spike_ratio >= thresholds.high_spike_ratio
            && edge.evidence_count >= thresholds.high_density
        {
            Severity::High
        } else {
            Severity::Medium
        };

        let mut primary_actor_ids = vec![edge.key.0.clone(), edge.key.1.clone()];
        primary_actor_ids.sort();
        let primary_edge_ids = vec![format!("{}:{}", edge.key.0, edge.key.1)];

        let mut metrics = HashMap::new();
        metrics.insert("spike_ratio".to_string(), spike_ratio);
        metrics.insert("prev_evidence_count".to_string(), prev);
        metrics.insert("curr_evidence_count".to_string(), curr);

        let signal_key = compute_signal_key(
            DetectorKind::DensitySpike,
            ctx.window,
            Scope::Corridor,
            &primary_actor_ids,
            &primary_edge_ids,
        );

        out.push(SignalCandidate {
            kind: DetectorKind::DensitySpike,
            severity,
            scope: Scope::Corridor,
            window: ctx.window,
            primary_actor_ids: primary_actor_ids.clone(),
            primary_edge_ids,
            entities: primary_actor_ids,
            metrics,
            evidence_count: edge.evidence_count,
            summary: Summary {
                what: format!(
                    "Transfer density between {} and {} rose {:.0}% run over run",
                    edge.key.0,
                    edge.key.1,
                    spike_ratio * 100.0
                ),
                why_now: "evidence count grew faster than the configured spike ratio".to_string(),
                so_what: "an existing corridor is being used materially more than before"
                    .to_string(),
            },
            signal_key,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        Actor, ActorType, ClusterInput, Coverage, Edge, EdgeKey, EdgeType, ParticipationTrend,
        Snapshot, SnapshotId, Window,
    };
    use chrono::Utc;

    fn actor(id: &str) -> Actor {
        Actor {
            actor_id: id.to_string(),
            actor_type: ActorType::Trader,
            coverage: 1.0,
            inflow_usd: 0.0,
            outflow_usd: 0.0,
            net_flow_usd: 0.0,
            tx_count: 1,
            counterparty_count: 1,
            flow_share: 0.1,
            participation_trend: ParticipationTrend::Stable,
            cluster: ClusterInput::default(),
        }
    }

    fn snapshot(edges: Vec<Edge>) -> Snapshot {
        Snapshot {
            snapshot_id: SnapshotId("x".to_string()),
            window: Window::H24,
            built_at: Utc::now(),
            actors: vec![actor("a"), actor("b")],
            edges,
            coverage: Coverage {
                actors_coverage_pct: 100.0,
            },
        }
    }

    fn edge(evidence_count: u64) -> Edge {
        Edge {
            key: EdgeKey::new("a", "b"),
            evidence_count,
            weight: 0.9,
            confidence: 0.95,
            edge_type: EdgeType::Transfer,
            avg_coverage: 0.9,
            temporal_sync: 0.5,
        }
    }

    #[test]
    fn no_previous_snapshot_emits_nothing() {
        let current = snapshot(vec![edge(10)]);
        let ctx = DetectionContext {
            current: &current,
            previous: None,
            window: Window::H24,
        };
        assert!(detect(&ctx, &RuleThresholds::default()).is_empty());
    }

    #[test]
    fn large_jump_fires_high_severity() {
        let previous = snapshot(vec![edge(10)]);
        let current = snapshot(vec![edge(50)]);
        let ctx = DetectionContext {
            current: &current,
            previous: Some(&previous),
            window: Window::H24,
        };
        let out = detect(&ctx, &RuleThresholds::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity as u8, Severity::High as u8);
    }

    #[test]
    fn below_spike_ratio_does_not_fire() {
        let previous = snapshot(vec![edge(10)]);
        let current = snapshot(vec![edge(11)]);
        let ctx = DetectionContext {
            current: &current,
            previous: Some(&previous),
            window: Window::H24,
        };
        assert!(detect(&ctx, &RuleThresholds::default()).is_empty());
    }
}
