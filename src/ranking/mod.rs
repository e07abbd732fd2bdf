//! Periodic composite ranking of entities into BUY/WATCH/SELL buckets.

mod engine;

pub use engine::RankingEngine;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket {
    Buy,
    Watch,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    ScoreIncrease,
    ScoreDecrease,
    ConflictLock,
    RiskSpike,
    ActorSignalPositive,
    ActorSignalNegative,
    EngineSafetyDowngrade,
}

/// Raw, already-normalized-to-[0,100] inputs the ranking engine needs per
/// entity. Normalization itself is an external collaborator's concern.
#[derive(Debug, Clone)]
pub struct RankingInput {
    pub entity_addr: String,
    pub chain_id: String,
    pub market_cap_score: f64,
    pub volume_score: f64,
    pub momentum_score: f64,
    pub engine_confidence: f64,
    pub actor_signal_score: f64,
    pub risk_score: f64,
    pub conflict_lock: bool,
    pub recent_bucket_flips: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ranking {
    pub entity_addr: String,
    pub chain_id: String,
    pub composite_score: f64,
    pub confidence: f64,
    pub risk_score: f64,
    pub bucket: Bucket,
    pub stability_penalty: f64,
}

/// Append-only audit trail of bucket changes; never mutated, only appended to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketTransition {
    pub entity_addr: String,
    pub from: Option<Bucket>,
    pub to: Bucket,
    pub reason: TransitionReason,
}
