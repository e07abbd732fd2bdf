use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::{ClusterPolicy, ConfidenceThresholds, ConfidenceWeights};
use crate::decay::half_life_decay;
use crate::rules::SignalCandidate;
use crate::snapshot::Actor;

use super::{clamp01, ConfidenceLabel, ConfidenceResult, Penalty, Trace};

const ACTOR_WEIGHT_EXCHANGE_OR_MM: f64 = 0.4;
const ACTOR_WEIGHT_FLOW_SHARE: f64 = 0.3;
const ACTOR_WEIGHT_CONNECTIVITY: f64 = 0.2;
const ACTOR_WEIGHT_HISTORY: f64 = 0.1;
const CONNECTIVITY_SCALE: f64 = 50.0;
const HISTORY_SCALE: f64 = 100.0;
const FLOW_FLOOR_USD: f64 = 100_000.0;
const FLOW_CEILING_USD: f64 = 50_000_000.0;
const ACTOR_CAP_COUNT: usize = 50;
const ACTOR_CAP_SCORE: f64 = 79.0;

/// Everything the scorer needs beyond the candidate itself: the primary
/// actors it concerns, coverage from the snapshot it was produced from, and
/// lifecycle context used for temporal decay.
pub struct ConfidenceInput<'a> {
    pub candidate: &'a SignalCandidate,
    pub primary_actors: &'a [Actor],
    pub snapshot_coverage_pct: f64,
    pub has_7d_support: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
    thresholds: ConfidenceThresholds,
    cluster_policy: ClusterPolicy,
    decay_half_life_days: f64,
}

impl ConfidenceScorer {
    pub fn new(
        weights: ConfidenceWeights,
        thresholds: ConfidenceThresholds,
        cluster_policy: ClusterPolicy,
        decay_half_life_days: f64,
    ) -> Self {
        Self {
            weights,
            thresholds,
            cluster_policy,
            decay_half_life_days,
        }
    }

    pub fn score(&self, input: &ConfidenceInput) -> ConfidenceResult {
        let coverage_score = clamp01(input.snapshot_coverage_pct / 100.0) * 100.0;
        let actor_weights = self.actor_weights(input.primary_actors);
        let actors_score = self.actors_subscore(input.primary_actors, &actor_weights);
        let flow_score = self.flow_subscore(input.candidate, input.primary_actors);
        let temporal_score = self.temporal_subscore(input.candidate.window, input.has_7d_support);
        let evidence_score = self.evidence_subscore(input.candidate);

        let mut subscores = HashMap::new();
        subscores.insert("coverage".to_string(), coverage_score);
        subscores.insert("actors".to_string(), actors_score);
        subscores.insert("flow".to_string(), flow_score);
        subscores.insert("temporal".to_string(), temporal_score);
        subscores.insert("evidence".to_string(), evidence_score);

        let mut weights = HashMap::new();
        weights.insert("coverage".to_string(), self.weights.coverage);
        weights.insert("actors".to_string(), self.weights.actors);
        weights.insert("flow".to_string(), self.weights.flow);
        weights.insert("temporal".to_string(), self.weights.temporal);
        weights.insert("evidence".to_string(), self.weights.evidence);

        let raw_score = self.weights.coverage * coverage_score
            + self.weights.actors * actors_score
            + self.weights.flow * flow_score
            + self.weights.temporal * temporal_score
            + self.weights.evidence * evidence_score;

        let mut score = raw_score;
        let mut penalties = Vec::new();
        let mut reasons = Vec::new();

        if let Some(penalty) = self.cluster_confirmation_penalty(input.primary_actors, &actor_weights) {
            score *= penalty.multiplier;
            reasons.push(penalty.reason.clone());
            penalties.push(penalty);
        }

        if input.candidate.entities.len() < ACTOR_CAP_COUNT && score > ACTOR_CAP_SCORE {
            let multiplier = ACTOR_CAP_SCORE / score;
            reasons.push(format!(
                "actor count {} below cap floor, score capped at {}",
                input.candidate.entities.len(),
                ACTOR_CAP_SCORE
            ));
            penalties.push(Penalty {
                kind: "actor_cap",
                reason: format!(
                    "fewer than {ACTOR_CAP_COUNT} actors support this signal"
                ),
                multiplier,
                impact: score - ACTOR_CAP_SCORE,
            });
            score = ACTOR_CAP_SCORE;
        }

        let decay_factor = match input.last_triggered_at {
            Some(last) => {
                let delta_days = (input.now - last).num_seconds().max(0) as f64 / 86_400.0;
                half_life_decay(delta_days, self.decay_half_life_days)
            }
            None => 1.0,
        };
        if decay_factor < 1.0 {
            let before = score;
            score *= decay_factor;
            penalties.push(Penalty {
                kind: "temporal_decay",
                reason: "score decayed since last trigger".to_string(),
                multiplier: decay_factor,
                impact: before - score,
            });
            reasons.push(format!("decayed by factor {decay_factor:.3} since last trigger"));
        }

        let score = clamp01(score / 100.0) * 100.0;
        let label = self.label_for(score);

        let mut breakdown = subscores.clone();
        breakdown.insert("raw".to_string(), raw_score);
        breakdown.insert("final".to_string(), score);

        let trace = Trace {
            subscores,
            weights,
            raw_score,
            penalties: penalties.clone(),
            decay_factor,
            final_score: score,
            label,
        };

        ConfidenceResult {
            score,
            label,
            breakdown,
            reasons,
            trace,
        }
    }

    fn actor_weights(&self, actors: &[Actor]) -> HashMap<String, f64> {
        actors
            .iter()
            .map(|a| {
                let role = if a.actor_type.is_exchange_or_mm() { 1.0 } else { 0.0 };
                let flow_share = clamp01(a.flow_share);
                let connectivity = clamp01(a.counterparty_count as f64 / CONNECTIVITY_SCALE);
                let history = clamp01(a.tx_count as f64 / HISTORY_SCALE);
                let w = clamp01(
                    ACTOR_WEIGHT_EXCHANGE_OR_MM * role
                        + ACTOR_WEIGHT_FLOW_SHARE * flow_share
                        + ACTOR_WEIGHT_CONNECTIVITY * connectivity
                        + ACTOR_WEIGHT_HISTORY * history,
                );
                (a.actor_id.clone(), w)
            })
            .collect()
    }

    fn actors_subscore(&self, actors: &[Actor], weights: &HashMap<String, f64>) -> f64 {
        if actors.is_empty() {
            return 0.0;
        }
        let sum_w: f64 = weights.values().sum();
        let base = (sum_w * 40.0).min(80.0);

        let distinct_clusters: HashSet<Option<String>> = actors
            .iter()
            .map(|a| a.cluster.entity_id.clone().or_else(|| a.cluster.owner_id.clone()))
            .collect();
        let source_diverse = distinct_clusters.len() > 1;
        let multi_actor_confirmed = actors.len() >= 2 && sum_w >= 1.2 && source_diverse;

        let mut score = if multi_actor_confirmed {
            base + 20.0
        } else if actors.len() >= 2 {
            base + 10.0
        } else {
            base
        };

        let all_same_type = actors
            .windows(2)
            .all(|w| w[0].actor_type == w[1].actor_type);
        if actors.len() > 1 && all_same_type {
            score *= 0.85;
        }

        clamp01(score / 100.0) * 100.0
    }

    /// Flow subscore uses `|netFlowUsd|` exclusively: the candidate's own
    /// `net_flow_usd` metric if a detector recorded one, otherwise the sum
    /// of its primary actors' net flow.
    fn flow_subscore(&self, candidate: &SignalCandidate, actors: &[Actor]) -> f64 {
        let net_flow_usd = candidate
            .metrics
            .get("net_flow_usd")
            .copied()
            .unwrap_or_else(|| actors.iter().map(|a| a.net_flow_usd).sum::<f64>())
            .abs();

        if net_flow_usd <= FLOW_FLOOR_USD {
            return 20.0;
        }
        let span = FLOW_CEILING_USD - FLOW_FLOOR_USD;
        let fraction = clamp01((net_flow_usd - FLOW_FLOOR_USD) / span);
        20.0 + fraction * 80.0
    }

    fn temporal_subscore(&self, window: crate::snapshot::Window, has_7d_support: bool) -> f64 {
        use crate::snapshot::Window;
        match window {
            Window::D7 => 90.0,
            Window::H24 if has_7d_support => 80.0,
            Window::H24 => 60.0,
            Window::D30 => 85.0,
            _ => 50.0,
        }
    }

    fn evidence_subscore(&self, candidate: &SignalCandidate) -> f64 {
        (30.0 + 25.0 * candidate.metrics.len() as f64).min(100.0)
    }

    fn cluster_confirmation_penalty(
        &self,
        actors: &[Actor],
        weights: &HashMap<String, f64>,
    ) -> Option<Penalty> {
        if actors.len() < 2 {
            return None;
        }

        let mut cluster_weight: HashMap<String, f64> = HashMap::new();
        for a in actors {
            let key = a
                .cluster
                .entity_id
                .clone()
                .or_else(|| a.cluster.owner_id.clone())
                .or_else(|| a.cluster.community_id.clone())
                .or_else(|| a.cluster.infrastructure_id.clone())
                .unwrap_or_else(|| a.actor_id.clone());
            *cluster_weight.entry(key).or_insert(0.0) += weights.get(&a.actor_id).copied().unwrap_or(0.0);
        }

        let total: f64 = cluster_weight.values().sum();
        if total <= 0.0 {
            return None;
        }
        let top = cluster_weight.values().cloned().fold(0.0, f64::max);
        let dominance = top / total;

        let single_cluster = cluster_weight.len() < self.cluster_policy.min_clusters;
        let over_dominant = dominance > self.cluster_policy.max_dominance;

        if !single_cluster && !over_dominant {
            return None;
        }

        let multiplier = if single_cluster { 0.6 } else { 0.8 };
        let reason = if single_cluster {
            format!(
                "only {} distinct cluster(s) support this signal, below policy minimum {}",
                cluster_weight.len(),
                self.cluster_policy.min_clusters
            )
        } else {
            format!(
                "top cluster carries {:.0}% of evidence weight, above policy maximum {:.0}%",
                dominance * 100.0,
                self.cluster_policy.max_dominance * 100.0
            )
        };

        Some(Penalty {
            kind: "cluster_confirmation",
            reason,
            multiplier,
            impact: 0.0,
        })
    }

    fn label_for(&self, score: f64) -> ConfidenceLabel {
        if score >= self.thresholds.high {
            ConfidenceLabel::High
        } else if score >= self.thresholds.medium {
            ConfidenceLabel::Medium
        } else if score >= self.thresholds.low {
            ConfidenceLabel::Low
        } else {
            ConfidenceLabel::Hidden
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{DetectorKind, Scope, Severity, SignalKey, Summary};
    use crate::snapshot::{ActorType, ClusterInput, ParticipationTrend, Window};

    fn actor(id: &str, actor_type: ActorType, flow_share: f64, cluster_key: Option<&str>) -> Actor {
        Actor {
            actor_id: id.to_string(),
            actor_type,
            coverage: 0.9,
            inflow_usd: 1_000_000.0,
            outflow_usd: 100_000.0,
            net_flow_usd: 900_000.0,
            tx_count: 40,
            counterparty_count: 20,
            flow_share,
            participation_trend: ParticipationTrend::Stable,
            cluster: ClusterInput {
                entity_id: cluster_key.map(|s| s.to_string()),
                ..Default::default()
            },
        }
    }

    fn candidate(entities: Vec<String>) -> SignalCandidate {
        let mut metrics = HashMap::new();
        metrics.insert("evidence_count".to_string(), 40.0);
        metrics.insert("weight".to_string(), 0.9);
        SignalCandidate {
            kind: DetectorKind::NewCorridor,
            severity: Severity::High,
            scope: Scope::Corridor,
            window: Window::D7,
            primary_actor_ids: entities.clone(),
            primary_edge_ids: vec![],
            entities,
            metrics,
            evidence_count: 40,
            summary: Summary {
                what: "test".to_string(),
                why_now: "test".to_string(),
                so_what: "test".to_string(),
            },
            signal_key: SignalKey("deadbeef".to_string()),
        }
    }

    #[test]
    fn diverse_strong_actors_score_high() {
        let actors = vec![
            actor("ex1", ActorType::Exchange, 0.6, Some("cluster-a")),
            actor("fund1", ActorType::Fund, 0.6, Some("cluster-b")),
        ];
        let scorer = ConfidenceScorer::new(
            ConfidenceWeights::default(),
            ConfidenceThresholds::default(),
            ClusterPolicy::default(),
            3.0,
        );
        let input = ConfidenceInput {
            candidate: &candidate(vec!["ex1".to_string(), "fund1".to_string()]),
            primary_actors: &actors,
            snapshot_coverage_pct: 95.0,
            has_7d_support: true,
            last_triggered_at: None,
            now: Utc::now(),
        };
        let result = scorer.score(&input);
        assert_eq!(result.label, ConfidenceLabel::High);
    }

    #[test]
    fn single_cluster_gets_confirmation_penalty() {
        let actors = vec![
            actor("a", ActorType::Trader, 0.5, Some("cluster-a")),
            actor("b", ActorType::Trader, 0.5, Some("cluster-a")),
        ];
        let scorer = ConfidenceScorer::new(
            ConfidenceWeights::default(),
            ConfidenceThresholds::default(),
            ClusterPolicy::default(),
            3.0,
        );
        let input = ConfidenceInput {
            candidate: &candidate(vec!["a".to_string(), "b".to_string()]),
            primary_actors: &actors,
            snapshot_coverage_pct: 95.0,
            has_7d_support: true,
            last_triggered_at: None,
            now: Utc::now(),
        };
        let result = scorer.score(&input);
        assert!(result
            .trace
            .penalties
            .iter()
            .any(|p| p.kind == "cluster_confirmation"));
    }

    #[test]
    fn decay_reduces_score_from_stale_trigger() {
        let actors = vec![actor("a", ActorType::Exchange, 0.7, Some("cluster-a"))];
        let scorer = ConfidenceScorer::new(
            ConfidenceWeights::default(),
            ConfidenceThresholds::default(),
            ClusterPolicy::default(),
            3.0,
        );
        let now = Utc::now();
        let input_fresh = ConfidenceInput {
            candidate: &candidate(vec!["a".to_string()]),
            primary_actors: &actors,
            snapshot_coverage_pct: 95.0,
            has_7d_support: true,
            last_triggered_at: None,
            now,
        };
        let input_stale = ConfidenceInput {
            candidate: &candidate(vec!["a".to_string()]),
            primary_actors: &actors,
            snapshot_coverage_pct: 95.0,
            has_7d_support: true,
            last_triggered_at: Some(now - chrono::Duration::days(6)),
            now,
        };
        let fresh = scorer.score(&input_fresh);
        let stale = scorer.score(&input_stale);
        assert!(stale.score < fresh.score);
    }
}
