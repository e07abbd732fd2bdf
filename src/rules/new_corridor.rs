use std::collections::HashMap;

use crate::config::RuleThresholds;

use super::key::compute_signal_key;
use super::{clamp01, DetectionContext, DetectorKind, Scope, Severity, SignalCandidate, Summary};

/// Edges present in `current` but absent in `previous`, above density/weight/
/// confidence/coverage floors.
pub fn detect(ctx: &DetectionContext, thresholds: &RuleThresholds) -> Vec<SignalCandidate> {
    let Some(previous) = ctx.previous else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for edge in &ctx.current.edges {
        if previous.edge(&edge.key).is_some() {
            continue;
        }
        if edge.evidence_count < thresholds.min_density
            || edge.weight < thresholds.min_weight
            || edge.confidence < thresholds.min_confidence
            || edge.avg_coverage < thresholds.coverage_required
        {
            continue;
        }

        let severity = if edge.evidence_count >= thresholds.high_density
            && edge.confidence >= thresholds.min_confidence
        {
            Severity::High
        } else if edge.evidence_count >= thresholds.min_density {
            Severity::Medium
        } else {
            Severity::Low
        };

        let mut primary_actor_ids = vec![edge.key.0.clone(), edge.key.1.clone()];
        primary_actor_ids.sort();
        let primary_edge_ids = vec![format!("{}:{}", edge.key.0, edge.key.1)];

        let mut metrics = HashMap::new();
        metrics.insert("evidence_count".to_string(), edge.evidence_count as f64);
        metrics.insert("weight".to_string(), edge.weight);
        metrics.insert("confidence".to_string(), edge.confidence);
        metrics.insert("avg_coverage".to_string(), clamp01(edge.avg_coverage));

        let signal_key = compute_signal_key(
            DetectorKind::NewCorridor,
            ctx.window,
            Scope::Corridor,
            &primary_actor_ids,
            &primary_edge_ids,
        );

        out.push(SignalCandidate {
            kind: DetectorKind::NewCorridor,
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
                    "New corridor between {} and {} with {} transfers in window",
                    edge.key.0, edge.key.1, edge.evidence_count
                ),
                why_now: "edge absent in the previous comparable snapshot".to_string(),
                so_what: "a previously unconnected actor pair began transacting at density"
                    .to_string(),
            },
            signal_key,
        });
    }
    out
}
