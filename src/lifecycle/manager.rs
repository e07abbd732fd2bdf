use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::confidence::ConfidenceResult;
use crate::rules::{SignalCandidate, SignalKey};

use super::{ResolveReason, Signal, SignalState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub created: u32,
    pub updated: u32,
    pub archived: u32,
}

pub struct LifecycleManager {
    min_confidence_to_activate: f64,
    runs_to_cooldown: u32,
    runs_to_resolve: u32,
}

impl LifecycleManager {
    pub fn new(min_confidence_to_activate: f64, runs_to_cooldown: u32, runs_to_resolve: u32) -> Self {
        Self {
            min_confidence_to_activate,
            runs_to_cooldown,
            runs_to_resolve,
        }
    }

    /// Reconciles this run's triggered candidates against the persistent
    /// signal map, mutating it in place, and returns run statistics.
    ///
    /// `existing` holds every non-Resolved signal for the window being
    /// processed; a Resolved signal is terminal and would not normally
    /// still be present, but if it is, it is left untouched.
    pub fn reconcile(
        &self,
        existing: &mut HashMap<SignalKey, Signal>,
        triggered: Vec<(SignalCandidate, ConfidenceResult)>,
        now: DateTime<Utc>,
    ) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        let triggered_keys: HashSet<SignalKey> =
            triggered.iter().map(|(c, _)| c.signal_key.clone()).collect();

        for (candidate, confidence) in triggered {
            if confidence.score < self.min_confidence_to_activate {
                // HIDDEN: never persisted, never counted.
                continue;
            }

            match existing.get_mut(&candidate.signal_key) {
                Some(signal) => {
                    if signal.state == SignalState::Resolved {
                        continue;
                    }
                    signal.state = SignalState::Active;
                    signal.severity = candidate.severity;
                    signal.confidence_score = confidence.score;
                    signal.confidence_label = confidence.label;
                    signal.snapshots_without_trigger = 0;
                    signal.last_triggered_at = now;
                    signal.candidate = candidate;
                    signal.confidence = confidence;
                    outcome.updated += 1;
                }
                None => {
                    let signal_key = candidate.signal_key.clone();
                    let signal = Signal {
                        signal_key: signal_key.clone(),
                        window: candidate.window,
                        scope: candidate.scope,
                        severity: candidate.severity,
                        state: SignalState::Active,
                        confidence_score: confidence.score,
                        confidence_label: confidence.label,
                        snapshots_without_trigger: 0,
                        first_triggered_at: now,
                        last_triggered_at: now,
                        resolve_reason: None,
                        candidate,
                        confidence,
                    };
                    existing.insert(signal_key, signal);
                    outcome.created += 1;
                }
            }
        }

        for signal in existing.values_mut() {
            if triggered_keys.contains(&signal.signal_key) {
                continue;
            }
            if matches!(signal.state, SignalState::Resolved) {
                continue;
            }

            signal.snapshots_without_trigger += 1;

            match signal.state {
                SignalState::Active if signal.snapshots_without_trigger >= self.runs_to_cooldown => {
                    signal.state = SignalState::Cooldown;
                    signal.snapshots_without_trigger = 0;
                }
                SignalState::Cooldown if signal.snapshots_without_trigger >= self.runs_to_resolve => {
                    signal.state = SignalState::Resolved;
                    signal.resolve_reason = Some(ResolveReason::NotRetriggered);
                    outcome.archived += 1;
                }
                _ => {}
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceLabel;
    use crate::rules::{DetectorKind, Scope, Severity, Summary};
    use crate::snapshot::Window;
    use std::collections::HashMap as Map;

    fn candidate(key: &str) -> SignalCandidate {
        SignalCandidate {
            kind: DetectorKind::NewCorridor,
            severity: Severity::High,
            scope: Scope::Corridor,
            window: Window::H24,
            primary_actor_ids: vec!["a".to_string()],
            primary_edge_ids: vec![],
            entities: vec!["a".to_string()],
            metrics: Map::new(),
            evidence_count: 10,
            summary: Summary {
                what: "t".to_string(),
                why_now: "t".to_string(),
                so_what: "t".to_string(),
            },
            signal_key: SignalKey(key.to_string()),
        }
    }

    fn confidence(score: f64) -> ConfidenceResult {
        ConfidenceResult {
            score,
            label: ConfidenceLabel::High,
            breakdown: Map::new(),
            reasons: vec![],
            trace: crate::confidence::Trace {
                subscores: Map::new(),
                weights: Map::new(),
                raw_score: score,
                penalties: vec![],
                decay_factor: 1.0,
                final_score: score,
                label: ConfidenceLabel::High,
            },
        }
    }

    #[test]
    fn new_triggered_candidate_activates_immediately() {
        let manager = LifecycleManager::new(40.0, 3, 6);
        let mut store = HashMap::new();
        let now = Utc::now();
        let outcome = manager.reconcile(&mut store, vec![(candidate("k1"), confidence(90.0))], now);
        assert_eq!(outcome.created, 1);
        assert_eq!(store[&SignalKey("k1".to_string())].state, SignalState::Active);
    }

    #[test]
    fn below_activation_threshold_stays_hidden() {
        let manager = LifecycleManager::new(40.0, 3, 6);
        let mut store = HashMap::new();
        let outcome = manager.reconcile(&mut store, vec![(candidate("k1"), confidence(10.0))], Utc::now());
        assert_eq!(outcome.created, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn missed_runs_progress_to_cooldown_then_resolved() {
        let manager = LifecycleManager::new(40.0, 2, 2);
        let mut store = HashMap::new();
        let now = Utc::now();
        manager.reconcile(&mut store, vec![(candidate("k1"), confidence(90.0))], now);

        manager.reconcile(&mut store, vec![], now);
        assert_eq!(store[&SignalKey("k1".to_string())].state, SignalState::Active);

        manager.reconcile(&mut store, vec![], now);
        assert_eq!(store[&SignalKey("k1".to_string())].state, SignalState::Cooldown);

        manager.reconcile(&mut store, vec![], now);
        assert_eq!(store[&SignalKey("k1".to_string())].state, SignalState::Cooldown);

        let outcome = manager.reconcile(&mut store, vec![], now);
        assert_eq!(store[&SignalKey("k1".to_string())].state, SignalState::Resolved);
        assert_eq!(outcome.archived, 1);
    }

    #[test]
    fn retrigger_during_cooldown_resets_to_active() {
        let manager = LifecycleManager::new(40.0, 1, 5);
        let mut store = HashMap::new();
        let now = Utc::now();
        manager.reconcile(&mut store, vec![(candidate("k1"), confidence(90.0))], now);
        manager.reconcile(&mut store, vec![], now);
        assert_eq!(store[&SignalKey("k1".to_string())].state, SignalState::Cooldown);

        manager.reconcile(&mut store, vec![(candidate("k1"), confidence(90.0))], now);
        let signal = &store[&SignalKey("k1".to_string())];
        assert_eq!(signal.state, SignalState::Active);
        assert_eq!(signal.snapshots_without_trigger, 0);
    }
}
