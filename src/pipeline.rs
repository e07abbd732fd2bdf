//! Wires the five core subsystems into one engine run per window (§2, §5).
//!
//! This is the orchestration layer the scheduler's job closures call into:
//! build a snapshot, run the detectors against it and the previous
//! comparable snapshot, score and reconcile the resulting candidates against
//! the persistent signal store, dispatch anything that clears the dispatch
//! policy, and write the run record exactly once. Recoverable errors are
//! absorbed into the run record's stats; only `EngineError::Fatal` aborts
//! the run with `?`, matching the split in §7.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::confidence::{ConfidenceInput, ConfidenceScorer};
use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::lifecycle::{LifecycleManager, RunOutcome, Signal};
use crate::rules::RuleEngine;
use crate::snapshot::{ActorRegistry, SnapshotBuilder, Window};
use crate::store::{RunRecord, RunStatus, SignalStore, SnapshotStore};
use crate::transfer::TransferSource;

/// One engine run over one window: snapshot → detect → score → reconcile →
/// dispatch → run record. Generic over any store implementing both
/// `SnapshotStore` and `SignalStore` (the `SqliteStore` default does both)
/// and any `Dispatcher`, so tests can swap in in-memory fakes.
pub struct EngineRun<'a, Store, Disp> {
    pub store: &'a Store,
    pub dispatcher: &'a Disp,
    pub config: &'a EngineConfig,
}

impl<'a, Store, Disp> EngineRun<'a, Store, Disp>
where
    Store: SnapshotStore + SignalStore,
    Disp: Dispatcher,
{
    pub fn new(store: &'a Store, dispatcher: &'a Disp, config: &'a EngineConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    pub async fn run(
        &self,
        source: &dyn TransferSource,
        chain: &str,
        window: Window,
        registry: &ActorRegistry,
        now: DateTime<Utc>,
    ) -> Result<(RunRecord, RunOutcome), EngineError> {
        let run_id = Uuid::new_v4().to_string();
        let mut record = RunRecord {
            run_id: run_id.clone(),
            window,
            snapshot_id: None,
            started_at: now,
            completed_at: None,
            status: RunStatus::Running,
            created: 0,
            updated: 0,
            archived: 0,
            errors: 0,
            error: None,
        };

        let result = self.run_inner(source, chain, window, registry, now, &mut record).await;

        record.completed_at = Some(Utc::now());
        match &result {
            Ok(outcome) => {
                record.status = RunStatus::Completed;
                record.created = outcome.created;
                record.updated = outcome.updated;
                record.archived = outcome.archived;
            }
            Err(e) => {
                record.status = RunStatus::Failed;
                record.error = Some(e.to_string());
            }
        }

        result.map(|outcome| (record.clone(), outcome)).map_err(|e| {
            tracing::error!(run_id = %run_id, window = %window, error = %e, "engine run aborted");
            e
        })
    }

    async fn run_inner(
        &self,
        source: &dyn TransferSource,
        chain: &str,
        window: Window,
        registry: &ActorRegistry,
        now: DateTime<Utc>,
        record: &mut RunRecord,
    ) -> Result<RunOutcome, EngineError> {
        let previous = self.store.get_latest(window).await?;

        let builder = SnapshotBuilder::new();
        let current = builder
            .build(source, chain, window, now, registry, previous.as_ref())
            .await?;
        record.snapshot_id = Some(current.snapshot_id.0.clone());
        self.store.put(&current).await?;

        let has_7d_support = if window == Window::H24 {
            self.store.get_latest(Window::D7).await?.is_some()
        } else {
            false
        };

        let thresholds = self.config.thresholds_for(window);
        let ctx = crate::rules::DetectionContext {
            current: &current,
            previous: previous.as_ref(),
            window,
        };
        let candidates = RuleEngine::new().detect(&ctx, &thresholds, self.config.max_signals_per_run);

        let mut existing = self.store.find_active_by_window(window).await?;

        let scorer = ConfidenceScorer::new(
            self.config.confidence_weights,
            self.config.confidence_thresholds,
            self.config.cluster_policy,
            self.config.lifecycle_policy.decay_half_life_days,
        );

        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let primary_actors: Vec<_> = candidate
                .primary_actor_ids
                .iter()
                .filter_map(|id| current.actor(id).cloned())
                .collect();
            let last_triggered_at = existing.get(&candidate.signal_key).map(|s| s.last_triggered_at);
            let input = ConfidenceInput {
                candidate: &candidate,
                primary_actors: &primary_actors,
                snapshot_coverage_pct: current.coverage.actors_coverage_pct,
                has_7d_support,
                last_triggered_at,
                now,
            };
            let confidence = scorer.score(&input);
            scored.push((candidate, confidence));
        }

        let lifecycle = LifecycleManager::new(
            self.config.lifecycle_policy.min_confidence_to_activate,
            self.config.lifecycle_policy.runs_to_cooldown,
            self.config.lifecycle_policy.runs_to_resolve,
        );
        let outcome = lifecycle.reconcile(&mut existing, scored, now);

        for signal in existing.values() {
            if let Err(e) = self.store.upsert_by_key(signal).await {
                if matches!(e, EngineError::StoreConflict(_)) {
                    // retry once, per §7's StoreConflict policy
                    if self.store.upsert_by_key(signal).await.is_err() {
                        record.errors += 1;
                    }
                } else {
                    return Err(e);
                }
            }
        }

        let dispatchable: Vec<Signal> = existing
            .values()
            .filter(|s| s.is_dispatchable())
            .cloned()
            .collect();
        if !dispatchable.is_empty() {
            if let Err(e) = self.dispatcher.dispatch(&dispatchable).await {
                // DispatcherError never rolls back the signal write.
                tracing::warn!(window = %window, error = %e, "dispatch failed, signals remain active");
                record.errors += 1;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NullDispatcher;
    use crate::snapshot::ActorType;
    use crate::store::SqliteStore;
    use crate::transfer::{Attribution, EdgeKind, InMemoryTransferSource, Transfer, TransferEndpoint};

    fn endpoint(id: &str) -> TransferEndpoint {
        TransferEndpoint {
            actor_id: id.to_string(),
            attribution: Attribution::Verified,
        }
    }

    fn transfer(from: &str, to: &str, usd: f64, idx: u32, when: DateTime<Utc>) -> Transfer {
        Transfer {
            chain: "eth".to_string(),
            tx_hash: format!("0x{from}{to}{idx}"),
            log_index: idx,
            from: endpoint(from),
            to: endpoint(to),
            asset_address: "0xtoken".to_string(),
            amount_raw: 1,
            amount_usd: usd,
            timestamp: when,
            edge_type: EdgeKind::Transfer,
        }
    }

    #[tokio::test]
    async fn first_run_with_no_previous_snapshot_creates_no_signals() {
        let store = SqliteStore::in_memory().unwrap();
        let dispatcher = NullDispatcher;
        let config = EngineConfig::default();
        let source = InMemoryTransferSource::new();
        let now = Utc::now();
        for i in 0..60u32 {
            source.push(transfer("a", "b", 50_000.0, i, now - chrono::Duration::minutes(i as i64)));
        }
        let registry = ActorRegistry::new();
        let run = EngineRun::new(&store, &dispatcher, &config);
        let (record, outcome) = run
            .run(&source, "eth", Window::H24, &registry, now)
            .await
            .unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        // NEW_CORRIDOR never fires without a previous snapshot to diff against.
        assert_eq!(outcome.created, 0);
    }

    #[tokio::test]
    async fn second_run_detects_new_corridor_against_first() {
        let store = SqliteStore::in_memory().unwrap();
        let dispatcher = NullDispatcher;
        let config = EngineConfig::default();
        let source = InMemoryTransferSource::new();
        let now = Utc::now();

        let mut registry = ActorRegistry::new();
        registry.insert("a", ActorType::Exchange, Default::default());
        registry.insert("b", ActorType::Fund, Default::default());

        let run = EngineRun::new(&store, &dispatcher, &config);
        run.run(&source, "eth", Window::H24, &registry, now - chrono::Duration::hours(1))
            .await
            .unwrap();

        for i in 0..60u32 {
            source.push(transfer(
                "a",
                "b",
                200_000.0,
                i,
                now - chrono::Duration::minutes(i as i64),
            ));
        }
        let (_, outcome) = run
            .run(&source, "eth", Window::H24, &registry, now)
            .await
            .unwrap();
        assert!(outcome.created >= 1);
    }
}
