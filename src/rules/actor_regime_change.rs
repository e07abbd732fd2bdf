use std::collections::HashMap;

use crate::config::RuleThresholds;
use crate::snapshot::ParticipationTrend;

use super::key::compute_signal_key;
use super::{DetectionContext, DetectorKind, Scope, Severity, SignalCandidate, Summary};

/// Fires when an actor's participation trend moves along one of the three
/// watched transitions between consecutive comparable snapshots.
pub fn detect(ctx: &DetectionContext, _thresholds: &RuleThresholds) -> Vec<SignalCandidate> {
    let Some(previous) = ctx.previous else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for actor in &ctx.current.actors {
        let Some(prev_actor) = previous.actor(&actor.actor_id) else {
            continue;
        };
        let from = prev_actor.participation_trend;
        let to = actor.participation_trend;
        if from == to {
            continue;
        }

        let watched = matches!(
            (from, to),
            (ParticipationTrend::Stable, ParticipationTrend::Increasing)
                | (ParticipationTrend::Increasing, ParticipationTrend::Decreasing)
                | (ParticipationTrend::Stable, ParticipationTrend::Decreasing)
        );
        if !watched {
            continue;
        }

        let severity = if matches!(
            (from, to),
            (ParticipationTrend::Increasing, ParticipationTrend::Decreasing)
        ) {
            Severity::High
        } else {
            Severity::Medium
        };

        let primary_actor_ids = vec![actor.actor_id.clone()];
        let mut metrics = HashMap::new();
        metrics.insert("tx_count".to_string(), actor.tx_count as f64);
        metrics.insert("prev_tx_count".to_string(), prev_actor.tx_count as f64);

        let signal_key = compute_signal_key(
            DetectorKind::ActorRegimeChange,
            ctx.window,
            Scope::Actor,
            &primary_actor_ids,
            &[],
        );

        out.push(SignalCandidate {
            kind: DetectorKind::ActorRegimeChange,
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
                    "{} participation trend moved {:?} -> {:?}",
                    actor.actor_id, from, to
                ),
                why_now: "trend classification differs from the previous comparable snapshot"
                    .to_string(),
                so_what: "this actor's engagement regime is shifting".to_string(),
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
        Actor, ActorType, ClusterInput, Coverage, Snapshot, SnapshotId, Window,
    };
    use chrono::Utc;

    fn actor(id: &str, trend: ParticipationTrend) -> Actor {
        Actor {
            actor_id: id.to_string(),
            actor_type: ActorType::Trader,
            coverage: 1.0,
            inflow_usd: 0.0,
            outflow_usd: 0.0,
            net_flow_usd: 0.0,
            tx_count: 10,
            counterparty_count: 1,
            flow_share: 0.1,
            participation_trend: trend,
            cluster: ClusterInput::default(),
        }
    }

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

    #[test]
    fn increasing_to_decreasing_is_high_severity() {
        let previous = snapshot(vec![actor("a", ParticipationTrend::Increasing)]);
        let current = snapshot(vec![actor("a", ParticipationTrend::Decreasing)]);
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
    fn unwatched_transition_does_not_fire() {
        let previous = snapshot(vec![actor("a", ParticipationTrend::Decreasing)]);
        let current = snapshot(vec![actor("a", ParticipationTrend::Stable)]);
        let ctx = DetectionContext {
            current: &current,
            previous: Some(&previous),
            window: Window::H24,
        };
        assert!(detect(&ctx, &RuleThresholds::default()).is_empty());
    }
}
