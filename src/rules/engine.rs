use std::collections::HashSet;

use crate::config::RuleThresholds;

use super::{
    actor_regime_change, density_spike, direction_imbalance, new_bridge, new_corridor,
    DetectionContext, SignalCandidate,
};

/// Runs all five detectors in a fixed order, deduplicates by `signal_key`
/// (first detector to emit a key wins; later emissions of the same key in
/// the same run are discarded), then applies the per-run cap.
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(
        &self,
        ctx: &DetectionContext,
        thresholds: &RuleThresholds,
        max_signals_per_run: usize,
    ) -> Vec<SignalCandidate> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for batch in [
            new_corridor::detect(ctx, thresholds),
            density_spike::detect(ctx, thresholds),
            direction_imbalance::detect(ctx, thresholds),
            actor_regime_change::detect(ctx, thresholds),
            new_bridge::detect(ctx, thresholds),
        ] {
            for candidate in batch {
                if seen.insert(candidate.signal_key.clone()) {
                    out.push(candidate);
                }
            }
        }

        out.truncate(max_signals_per_run);
        out
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}
