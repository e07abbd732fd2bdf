use std::collections::HashMap;

use crate::config::RuleThresholds;

use super::key::compute_signal_key;
use super::{DetectionContext, DetectorKind, Scope, Severity, SignalCandidate, Summary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Inflow,
    Outflow,
}

/// Per-actor net-flow imbalance: a lopsided in/out ratio at material volume.
pub fn detect(ctx: &DetectionContext, thresholds: &RuleThresholds) -> Vec<SignalCandidate> {
    let mut out = Vec::new();
    for actor in &ctx.current.actors {
        let total = actor.inflow_usd + actor.outflow_usd;
        if total < thresholds.min_total_flow_usd {
            continue;
        }
        let net = actor.net_flow_usd;
        if net.abs() < thresholds.min_net_flow_usd {
            continue;
        }
        let imbalance_ratio = net.abs() / total;
        if imbalance_ratio < thresholds.min_imbalance_ratio || actor.coverage < thresholds.coverage_required
        {
            continue;
        }

        let direction = if net >= 0.0 {
            Direction::Inflow
        } else {
            Direction::Outflow
        };
        let severity = if imbalance_ratio >= 0.9 {
            Severity::High
        } else if imbalance_ratio >= thresholds.min_imbalance_ratio {
            Severity::Medium
        } else {
            Severity::Low
        };

        let primary_actor_ids = vec![actor.actor_id.clone()];

        let mut metrics = HashMap::new();
        metrics.insert("imbalance_ratio".to_string(), imbalance_ratio);
        metrics.insert("net_flow_usd".to_string(), net);
        metrics.insert("total_flow_usd".to_string(), total);

        let signal_key = compute_signal_key(
            DetectorKind::DirectionImbalance,
            ctx.window,
            Scope::Actor,
            &primary_actor_ids,
            &[],
        );

        let direction_word = match direction {
            Direction::Inflow => "inflow",
            Direction::Outflow => "outflow",
        };

        out.push(SignalCandidate {
            kind: DetectorKind::DirectionImbalance,
            severity,
            scope: Scope::Actor,
            window: ctx.window,
            primary_actor_ids: primary_actor_ids.clone(),
            primary_edge_ids: vec![],
            entities: primary_actor_ids,
            metrics,
            evidence_count: actor.tx_count,
            summary: Summary {
                what: format!(
                    "{} shows {:.0}% {} imbalance over ${:.0} total flow",
                    actor.actor_id,
                    imbalance_ratio * 100.0,
                    direction_word,
                    total
                ),
                why_now: "net flow direction dominates total volume for this window".to_string(),
                so_what: format!("actor is net {direction_word} at a one-sided ratio"),
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
        Actor, ActorType, ClusterInput, Coverage, ParticipationTrend, Snapshot, SnapshotId, Window,
    };
    use chrono::Utc;

    fn snapshot(actors: Vec<Actor>) -> Snapshot {
        Snapshot {
            snapshot_id: SnapshotId("x".to_string()),
            window: Window::H24,
            built_at: Utc::now(),
            actors,
            edges: vec![],
            coverage: Coverage {
                actors_coverage_pct: 100.0,
            },
        }
    }

    fn lopsided_actor() -> Actor {
        Actor {
            actor_id: "whale".to_string(),
            actor_type: ActorType::Trader,
            coverage: 0.9,
            inflow_usd: 900_000.0,
            outflow_usd: 10_000.0,
            net_flow_usd: 890_000.0,
            tx_count: 20,
            counterparty_count: 5,
            flow_share: 0.5,
            participation_trend: ParticipationTrend::Stable,
            cluster: ClusterInput::default(),
        }
    }

    #[test]
    fn lopsided_inflow_fires() {
        let current = snapshot(vec![lopsided_actor()]);
        let ctx = DetectionContext {
            current: &current,
            previous: None,
            window: Window::H24,
        };
        let out = detect(&ctx, &RuleThresholds::default());
        assert_eq!(out.len(), 1);
        assert!(out[0].summary.what.contains("inflow"));
    }

    #[test]
    fn balanced_flow_does_not_fire() {
        let mut actor = lopsided_actor();
        actor.inflow_usd = 500_000.0;
        actor.outflow_usd = 480_000.0;
        actor.net_flow_usd = 20_000.0;
        let current = snapshot(vec![actor]);
        let ctx = DetectionContext {
            current: &current,
            previous: None,
            window: Window::H24,
        };
        assert!(detect(&ctx, &RuleThresholds::default()).is_empty());
    }
}
