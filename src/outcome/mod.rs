//! Resolves realized outcomes for past ranking decisions and links them back
//! to the signals that influenced them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ranking::Bucket;
use crate::rules::SignalKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    OneDay,
    SevenDay,
    ThirtyDay,
}

impl Horizon {
    pub fn duration(self) -> chrono::Duration {
        match self {
            Horizon::OneDay => chrono::Duration::days(1),
            Horizon::SevenDay => chrono::Duration::days(7),
            Horizon::ThirtyDay => chrono::Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Confirmed,
    Rejected,
    Inconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendLabel {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeObservation {
    pub snapshot_id: String,
    pub entity_addr: String,
    pub horizon: Horizon,
    pub realized_return: f64,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendValidation {
    pub entity_addr: String,
    pub horizon: Horizon,
    pub label: TrendLabel,
}

/// Joins a ranking decision to its eventual outcome, naming which signals
/// contributed `actor_signal_score` at decision time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionOutcomeLink {
    pub entity_addr: String,
    pub horizon: Horizon,
    pub contributing_signal_keys: Vec<SignalKey>,
}

/// External collaborator providing realized price/volume movement. Wire
/// format and data source are out of scope; this is the consumed contract.
#[async_trait]
pub trait ReturnSource: Send + Sync {
    async fn realized_return(
        &self,
        entity_addr: &str,
        chain_id: &str,
        from: DateTime<Utc>,
        horizon: Horizon,
    ) -> Result<f64, EngineError>;
}

const FLAT_BAND: f64 = 0.02;
const DIRECTIONAL_THRESHOLD: f64 = 0.05;

pub struct OutcomeTracker;

impl OutcomeTracker {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        snapshot_id: &str,
        entity_addr: &str,
        bucket: Bucket,
        horizon: Horizon,
        realized_return: f64,
    ) -> OutcomeObservation {
        let verdict = match bucket {
            Bucket::Buy if realized_return >= DIRECTIONAL_THRESHOLD => Verdict::Confirmed,
            Bucket::Buy if realized_return <= -DIRECTIONAL_THRESHOLD => Verdict::Rejected,
            Bucket::Sell if realized_return <= -DIRECTIONAL_THRESHOLD => Verdict::Confirmed,
            Bucket::Sell if realized_return >= DIRECTIONAL_THRESHOLD => Verdict::Rejected,
            _ => Verdict::Inconclusive,
        };

        OutcomeObservation {
            snapshot_id: snapshot_id.to_string(),
            entity_addr: entity_addr.to_string(),
            horizon,
            realized_return,
            verdict,
        }
    }

    pub fn classify_trend(&self, entity_addr: &str, horizon: Horizon, realized_return: f64) -> TrendValidation {
        let label = if realized_return > FLAT_BAND {
            TrendLabel::Up
        } else if realized_return < -FLAT_BAND {
            TrendLabel::Down
        } else {
            TrendLabel::Flat
        };
        TrendValidation {
            entity_addr: entity_addr.to_string(),
            horizon,
            label,
        }
    }

    pub fn link_attribution(
        &self,
        entity_addr: &str,
        horizon: Horizon,
        contributing_signal_keys: Vec<SignalKey>,
    ) -> AttributionOutcomeLink {
        AttributionOutcomeLink {
            entity_addr: entity_addr.to_string(),
            horizon,
            contributing_signal_keys,
        }
    }
}

impl Default for OutcomeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_confirmed_on_positive_return() {
        let tracker = OutcomeTracker::new();
        let obs = tracker.evaluate("snap1", "0xabc", Bucket::Buy, Horizon::SevenDay, 0.10);
        assert_eq!(obs.verdict, Verdict::Confirmed);
    }

    #[test]
    fn buy_rejected_on_negative_return() {
        let tracker = OutcomeTracker::new();
        let obs = tracker.evaluate("snap1", "0xabc", Bucket::Buy, Horizon::SevenDay, -0.10);
        assert_eq!(obs.verdict, Verdict::Rejected);
    }

    #[test]
    fn watch_is_always_inconclusive() {
        let tracker = OutcomeTracker::new();
        let obs = tracker.evaluate("snap1", "0xabc", Bucket::Watch, Horizon::SevenDay, 0.5);
        assert_eq!(obs.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn trend_classification_bands() {
        let tracker = OutcomeTracker::new();
        assert_eq!(
            tracker.classify_trend("a", Horizon::OneDay, 0.10).label,
            TrendLabel::Up
        );
        assert_eq!(
            tracker.classify_trend("a", Horizon::OneDay, -0.10).label,
            TrendLabel::Down
        );
        assert_eq!(
            tracker.classify_trend("a", Horizon::OneDay, 0.0).label,
            TrendLabel::Flat
        );
    }
}
