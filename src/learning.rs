//! Orchestrates the ranking & outcome-learning loop (§1 subsystem 5): turns
//! active signals into per-entity ranking inputs, ranks them, resolves
//! realized outcomes through an external `ReturnSource`, and builds training
//! samples behind `DatasetBuilder`'s quality gates. This is the counterpart
//! to `pipeline::EngineRun` for the second half of §2's dependency graph.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::config::RankingWeights;
use crate::dataset::{BuildMode, DatasetBuilder, DriftLevel, LearningSample};
use crate::error::EngineError;
use crate::lifecycle::Signal;
use crate::outcome::{AttributionOutcomeLink, Horizon, OutcomeTracker, ReturnSource};
use crate::ranking::{Bucket, Ranking, RankingEngine, RankingInput};
use crate::rules::SignalKey;
use crate::store::RankingStore;

const NEUTRAL_EXTERNAL_SCORE: f64 = 50.0;

/// Stand-in for a live price/volume feed (external collaborator, §6): always
/// reports no movement, so the learning loop can still be exercised end to
/// end before a real feed is wired at the boundary.
pub struct NullReturnSource;

#[async_trait]
impl ReturnSource for NullReturnSource {
    async fn realized_return(
        &self,
        _entity_addr: &str,
        _chain_id: &str,
        _from: DateTime<Utc>,
        _horizon: Horizon,
    ) -> Result<f64, EngineError> {
        Ok(0.0)
    }
}

/// Builds one `RankingInput` per distinct primary actor named by an active
/// signal, with `engine_confidence` set to the strongest active signal
/// naming that actor. `market_cap_score`/`volume_score`/`momentum_score` are
/// seeded market data (§1 non-goal) and stay neutral until a real feed
/// replaces this boundary. Per-entity assembly is embarrassingly parallel,
/// the same fan-out this crate's `features` builders describe.
pub fn ranking_inputs_from_signals(chain_id: &str, active: &HashMap<SignalKey, Signal>) -> Vec<RankingInput> {
    let mut best_confidence: HashMap<String, f64> = HashMap::new();
    for signal in active.values() {
        for actor_id in &signal.candidate.primary_actor_ids {
            let slot = best_confidence.entry(actor_id.clone()).or_insert(0.0);
            if signal.confidence_score > *slot {
                *slot = signal.confidence_score;
            }
        }
    }

    best_confidence
        .into_par_iter()
        .map(|(entity_addr, engine_confidence)| RankingInput {
            entity_addr,
            chain_id: chain_id.to_string(),
            market_cap_score: NEUTRAL_EXTERNAL_SCORE,
            volume_score: NEUTRAL_EXTERNAL_SCORE,
            momentum_score: NEUTRAL_EXTERNAL_SCORE,
            engine_confidence,
            actor_signal_score: 0.0,
            risk_score: 0.0,
            conflict_lock: false,
            recent_bucket_flips: 0,
        })
        .collect()
}

/// One pass of the ranking/outcome/dataset loop, generic over any
/// `RankingStore` and `ReturnSource` the way `EngineRun` is generic over its
/// stores and dispatcher.
pub struct LearningRun<'a, Store, Return> {
    pub store: &'a Store,
    pub return_source: &'a Return,
    pub ranking_weights: RankingWeights,
    pub include_critical_drift: bool,
}

impl<'a, Store, Return> LearningRun<'a, Store, Return>
where
    Store: RankingStore,
    Return: ReturnSource,
{
    pub fn new(
        store: &'a Store,
        return_source: &'a Return,
        ranking_weights: RankingWeights,
        include_critical_drift: bool,
    ) -> Self {
        Self {
            store,
            return_source,
            ranking_weights,
            include_critical_drift,
        }
    }

    /// RankingEngine pass: ranks every entity named by an active signal and
    /// persists the result via bulk upsert. Returns the rankings so callers
    /// can feed them to `resolve_and_build_sample` per horizon.
    pub async fn rank(
        &self,
        chain_id: &str,
        active: &HashMap<SignalKey, Signal>,
        previous_buckets: impl Fn(&str) -> Option<Bucket>,
    ) -> Result<Vec<Ranking>, EngineError> {
        let inputs = ranking_inputs_from_signals(chain_id, active);
        let engine = RankingEngine::new(self.ranking_weights);
        let (rankings, transitions) = engine.rank_all(&inputs, previous_buckets);
        for t in &transitions {
            tracing::info!(
                entity = %t.entity_addr,
                from = ?t.from,
                to = ?t.to,
                reason = ?t.reason,
                "bucket transition"
            );
        }
        self.store.bulk_upsert(&rankings).await?;
        Ok(rankings)
    }

    /// OutcomeTracker + DatasetBuilder pass for one ranked entity at one
    /// horizon: resolves the realized return, classifies the trend, links
    /// the signals that contributed to the ranking decision, and builds a
    /// training sample behind the quality gates.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve_and_build_sample(
        &self,
        snapshot_id: &str,
        entity_addr: &str,
        chain_id: &str,
        bucket: Bucket,
        horizon: Horizon,
        ranked_at: DateTime<Utc>,
        contributing_signal_keys: Vec<SignalKey>,
        features: HashMap<String, f64>,
        drift_level: DriftLevel,
        mode: BuildMode,
        materialized: &impl Fn(&str) -> bool,
    ) -> Result<Option<LearningSample>, EngineError> {
        let tracker = OutcomeTracker::new();
        let realized_return = self
            .return_source
            .realized_return(entity_addr, chain_id, ranked_at, horizon)
            .await?;
        let observation = tracker.evaluate(snapshot_id, entity_addr, bucket, horizon, realized_return);
        tracing::debug!(entity = %entity_addr, verdict = ?observation.verdict, "outcome resolved");

        let trend = tracker.classify_trend(entity_addr, horizon, realized_return);
        let link: AttributionOutcomeLink = tracker.link_attribution(entity_addr, horizon, contributing_signal_keys);

        let builder = DatasetBuilder::new(self.include_critical_drift);
        Ok(builder.build_sample(
            snapshot_id,
            horizon,
            features,
            std::slice::from_ref(&trend),
            std::slice::from_ref(&link),
            drift_level,
            mode,
            materialized,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::{ConfidenceLabel, ConfidenceResult};
    use crate::lifecycle::SignalState;
    use crate::rules::{compute_signal_key, DetectorKind, Scope, Severity, Summary};
    use crate::snapshot::Window;
    use crate::store::SqliteStore;

    fn signal(actor: &str, confidence_score: f64) -> Signal {
        let signal_key = compute_signal_key(DetectorKind::NewCorridor, Window::H24, Scope::Actor, &[actor.to_string()], &[]);
        Signal {
            signal_key: signal_key.clone(),
            window: Window::H24,
            scope: Scope::Actor,
            severity: Severity::High,
            state: SignalState::Active,
            confidence_score,
            confidence_label: ConfidenceLabel::High,
            snapshots_without_trigger: 0,
            first_triggered_at: Utc::now(),
            last_triggered_at: Utc::now(),
            resolve_reason: None,
            candidate: crate::rules::SignalCandidate {
                kind: DetectorKind::NewCorridor,
                severity: Severity::High,
                scope: Scope::Actor,
                window: Window::H24,
                primary_actor_ids: vec![actor.to_string()],
                primary_edge_ids: vec![],
                entities: vec![actor.to_string()],
                metrics: HashMap::new(),
                evidence_count: 10,
                summary: Summary {
                    what: "x".into(),
                    why_now: "x".into(),
                    so_what: "x".into(),
                },
                signal_key,
            },
            confidence: ConfidenceResult {
                score: confidence_score,
                label: ConfidenceLabel::High,
                breakdown: HashMap::new(),
                reasons: vec![],
                trace: crate::confidence::Trace {
                    subscores: HashMap::new(),
                    weights: HashMap::new(),
                    raw_score: confidence_score,
                    penalties: vec![],
                    decay_factor: 1.0,
                    final_score: confidence_score,
                    label: ConfidenceLabel::High,
                },
            },
        }
    }

    #[test]
    fn ranking_inputs_take_strongest_confidence_per_actor() {
        let mut active = HashMap::new();
        let s1 = signal("0xabc", 70.0);
        active.insert(s1.signal_key.clone(), s1);
        let inputs = ranking_inputs_from_signals("eth", &active);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].engine_confidence, 70.0);
    }

    #[tokio::test]
    async fn rank_persists_to_store() {
        let store = SqliteStore::in_memory().unwrap();
        let source = NullReturnSource;
        let run = LearningRun::new(&store, &source, RankingWeights::default(), false);
        let mut active = HashMap::new();
        let s1 = signal("0xabc", 90.0);
        active.insert(s1.signal_key.clone(), s1);
        let rankings = run.rank("eth", &active, |_| None).await.unwrap();
        assert_eq!(rankings.len(), 1);
        let persisted = store.read_by_bucket(rankings[0].bucket, 10).await.unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn resolve_and_build_sample_yields_inconclusive_verdict_for_watch() {
        let store = SqliteStore::in_memory().unwrap();
        let source = NullReturnSource;
        let run = LearningRun::new(&store, &source, RankingWeights::default(), false);
        let sample = run
            .resolve_and_build_sample(
                "snap1",
                "0xabc",
                "eth",
                Bucket::Watch,
                Horizon::SevenDay,
                Utc::now(),
                vec![],
                HashMap::new(),
                DriftLevel::Normal,
                BuildMode::Full,
                &|_| false,
            )
            .await
            .unwrap()
            .unwrap();
        // No attribution link was supplied, so the hard gate fails regardless of verdict.
        assert!(!sample.quality.train_eligible);
    }
}
