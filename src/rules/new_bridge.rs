use std::collections::HashMap;

use crate::config::RuleThresholds;
use crate::snapshot::EdgeType;

use super::key::compute_signal_key;
use super::{DetectionContext, DetectorKind, Scope, Severity, SignalCandidate, Summary};

/// A new bridge-type edge with tightly synchronized timestamps on both legs.
/// Severity is capped at medium: bridges are inherently lower-confidence
/// evidence than direct transfers.
pub fn detect(ctx: &DetectionContext, thresholds: &RuleThresholds) -> Vec<SignalCandidate> {
    let Some(previous) = ctx.previous else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for edge in &ctx.current.edges {
        if edge.edge_type != EdgeType::Bridge {
            continue;
        }
        if previous.edge(&edge.key).is_some() {
            continue;
        }
        if edge.temporal_sync < thresholds.min_bridge_sync {
            continue;
        }

        let severity = if edge.evidence_count >= thresholds.min_density {
            Severity::Medium
        } else {
            Severity::Low
        };

        let mut primary_actor_ids = vec![edge.key.0.clone(), edge.key.1.clone()];
        primary_actor_ids.sort();
        let primary_edge_ids = vec![format!("{}:{}", edge.key.0, edge.key.1)];

        let mut metrics = HashMap::new();
        metrics.insert("temporal_sync".to_string(), edge.temporal_sync);
        metrics.insert("evidence_count".to_string(), edge.evidence_count as f64);

        let signal_key = compute_signal_key(
            DetectorKind::NewBridge,
            ctx.window,
            Scope::Corridor,
            &primary_actor_ids,
            &primary_edge_ids,
        );

        out.push(SignalCandidate {
            kind: DetectorKind::NewBridge,
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
                    "New bridge corridor between {} and {} with synchronized legs",
                    edge.key.0, edge.key.1
                ),
                why_now: "first observation of this bridge edge, timestamps tightly clustered"
                    .to_string(),
                so_what: "funds are moving cross-chain between these actors in lockstep"
                    .to_string(),
            },
            signal_key,
        });
    }
    out
}
