//! Admin surface (§6): run triggers, state queries, and configuration
//! toggles. The HTTP route surface itself is out of scope — this module
//! states the contract a router would sit on top of, plus the one named
//! invariant: while the freeze flag is `Active`, writes to ranking weights,
//! confidence weights, thresholds, or actor-signal caps are rejected and
//! logged as audit events.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ClusterPolicy, ConfidenceWeights, RankingWeights, RuleThresholds};
use crate::error::EngineError;
use crate::snapshot::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreezeState {
    Inactive,
    Active,
}

/// A single configuration write the admin surface can apply. Grouped as an
/// enum rather than a free-form patch so the freeze check has a closed set
/// of cases to gate, matching the enumerated configuration surface in §6.
#[derive(Debug, Clone)]
pub enum ConfigWrite {
    RankingWeights(RankingWeights),
    ConfidenceWeights(ConfidenceWeights),
    RuleThresholds(Window, RuleThresholds),
    ActorSignalCap(f64),
    ClusterPolicy(ClusterPolicy),
}

impl ConfigWrite {
    fn audit_label(&self) -> &'static str {
        match self {
            ConfigWrite::RankingWeights(_) => "ranking_weights",
            ConfigWrite::ConfidenceWeights(_) => "confidence_weights",
            ConfigWrite::RuleThresholds(..) => "rule_thresholds",
            ConfigWrite::ActorSignalCap(_) => "actor_signal_cap",
            ConfigWrite::ClusterPolicy(_) => "cluster_policy",
        }
    }
}

/// Holds the live, mutable configuration behind `parking_lot::RwLock`s: short,
/// synchronous critical sections for state read on every run and written
/// rarely, from admin calls.
pub struct FreezeGuard {
    state: RwLock<FreezeState>,
    ranking_weights: RwLock<RankingWeights>,
    confidence_weights: RwLock<ConfidenceWeights>,
    rule_thresholds: RwLock<std::collections::HashMap<Window, RuleThresholds>>,
    actor_signal_cap: RwLock<f64>,
    cluster_policy: RwLock<ClusterPolicy>,
}

impl FreezeGuard {
    pub fn new(
        ranking_weights: RankingWeights,
        confidence_weights: ConfidenceWeights,
        rule_thresholds: std::collections::HashMap<Window, RuleThresholds>,
        actor_signal_cap: f64,
        cluster_policy: ClusterPolicy,
    ) -> Self {
        Self {
            state: RwLock::new(FreezeState::Inactive),
            ranking_weights: RwLock::new(ranking_weights),
            confidence_weights: RwLock::new(confidence_weights),
            rule_thresholds: RwLock::new(rule_thresholds),
            actor_signal_cap: RwLock::new(actor_signal_cap),
            cluster_policy: RwLock::new(cluster_policy),
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(*self.state.read(), FreezeState::Active)
    }

    pub fn ranking_weights(&self) -> RankingWeights {
        *self.ranking_weights.read()
    }

    pub fn confidence_weights(&self) -> ConfidenceWeights {
        *self.confidence_weights.read()
    }

    /// Applies a configuration write, rejecting it with `PolicyViolation`
    /// while frozen. The rejection itself is logged as an audit event with
    /// `audit = true` so it can be filtered downstream.
    pub fn apply(&self, write: ConfigWrite) -> Result<(), EngineError> {
        if self.is_frozen() {
            warn!(audit = true, field = write.audit_label(), "rejected config write: freeze active");
            return Err(EngineError::PolicyViolation(format!(
                "cannot update {} while freeze is active",
                write.audit_label()
            )));
        }

        match write {
            ConfigWrite::RankingWeights(w) => *self.ranking_weights.write() = w,
            ConfigWrite::ConfidenceWeights(w) => *self.confidence_weights.write() = w,
            ConfigWrite::RuleThresholds(window, t) => {
                self.rule_thresholds.write().insert(window, t);
            }
            ConfigWrite::ActorSignalCap(cap) => *self.actor_signal_cap.write() = cap,
            ConfigWrite::ClusterPolicy(p) => *self.cluster_policy.write() = p,
        }
        Ok(())
    }

    /// Activating freeze is not itself audited by policy (it is the guard
    /// being armed); deactivating it is, since it reopens the write surface.
    pub fn set_freeze(&self, state: FreezeState) {
        let previous = *self.state.read();
        *self.state.write() = state;
        if previous == FreezeState::Active && state == FreezeState::Inactive {
            warn!(audit = true, "freeze deactivated");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatusView {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStateSnapshot {
    pub window: Window,
    pub status: RunStatusView,
    pub last_run_id: Option<String>,
}

/// Read/write contract for run triggers, state queries, and configuration
/// toggles. Transport (HTTP, CLI, …) is an external collaborator; only the
/// contract is modeled here.
#[async_trait]
pub trait AdminSurface: Send + Sync {
    async fn trigger_run(&self, window: Window) -> Result<String, EngineError>;
    async fn run_state(&self, window: Window) -> Result<RunStateSnapshot, EngineError>;
    async fn apply_config(&self, write: ConfigWrite) -> Result<(), EngineError>;
    async fn set_freeze(&self, state: FreezeState) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> FreezeGuard {
        FreezeGuard::new(
            RankingWeights::default(),
            ConfidenceWeights::default(),
            std::collections::HashMap::new(),
            20.0,
            ClusterPolicy::default(),
        )
    }

    #[test]
    fn write_succeeds_while_inactive() {
        let g = guard();
        assert!(g.apply(ConfigWrite::ActorSignalCap(25.0)).is_ok());
    }

    #[test]
    fn write_rejected_while_frozen() {
        let g = guard();
        g.set_freeze(FreezeState::Active);
        let result = g.apply(ConfigWrite::ActorSignalCap(25.0));
        assert!(matches!(result, Err(EngineError::PolicyViolation(_))));
    }

    #[test]
    fn state_unchanged_after_rejected_write() {
        let g = guard();
        g.set_freeze(FreezeState::Active);
        let _ = g.apply(ConfigWrite::ActorSignalCap(99.0));
        assert_eq!(g.apply(ConfigWrite::ActorSignalCap(99.0)).is_err(), true);
        g.set_freeze(FreezeState::Inactive);
        assert!(g.apply(ConfigWrite::ActorSignalCap(30.0)).is_ok());
    }
}
