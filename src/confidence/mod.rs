//! Weighted confidence scoring with actor-quality guards, cluster
//! confirmation and temporal decay.

mod scorer;

pub use scorer::{ConfidenceInput, ConfidenceScorer};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    Hidden,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub kind: &'static str,
    pub reason: String,
    pub multiplier: f64,
    pub impact: f64,
}

/// Every value that went into the final score, enough to recompute it from
/// scratch and get the same number back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub subscores: HashMap<String, f64>,
    pub weights: HashMap<String, f64>,
    pub raw_score: f64,
    pub penalties: Vec<Penalty>,
    pub decay_factor: f64,
    pub final_score: f64,
    pub label: ConfidenceLabel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub score: f64,
    pub label: ConfidenceLabel,
    pub breakdown: HashMap<String, f64>,
    pub reasons: Vec<String>,
    pub trace: Trace,
}

pub(crate) fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}
