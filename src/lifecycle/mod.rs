//! Signal lifecycle: reconciles candidates against the persistent signal
//! store by stable key and transitions state across engine runs.

mod manager;

pub use manager::{LifecycleManager, RunOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceResult;
use crate::rules::{Scope, Severity, SignalCandidate, SignalKey};
use crate::snapshot::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalState {
    New,
    Active,
    Cooldown,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveReason {
    NotRetriggered,
}

/// One durable record per `signal_key`. Exactly one live record exists per
/// key at any time; `Resolved` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_key: SignalKey,
    pub window: Window,
    pub scope: Scope,
    pub severity: Severity,
    pub state: SignalState,
    pub confidence_score: f64,
    pub confidence_label: crate::confidence::ConfidenceLabel,
    pub snapshots_without_trigger: u32,
    pub first_triggered_at: DateTime<Utc>,
    pub last_triggered_at: DateTime<Utc>,
    pub resolve_reason: Option<ResolveReason>,
    pub candidate: SignalCandidate,
    pub confidence: ConfidenceResult,
}

impl Signal {
    /// A signal may be dispatched iff it is high severity and its label is
    /// HIGH or MEDIUM; HIDDEN is never externally visible.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self.severity, Severity::High)
            && matches!(
                self.confidence_label,
                crate::confidence::ConfidenceLabel::High | crate::confidence::ConfidenceLabel::Medium
            )
    }
}
