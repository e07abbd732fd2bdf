//! Feature builders over windowed transfer data.
//!
//! Three independent, idempotent-per-`(network, bucket_timestamp)` builders.
//! Each is a pure function of its input window, so they carry no state.
//! `ActorFeatureBuilder` fans out over its actor set with `rayon`; market and
//! corridor features are computed one entity at a time, but nothing stops a
//! caller from driving separate entities through either builder concurrently
//! the same way.

pub mod actor;
pub mod corridor;
pub mod market;

pub use actor::{ActorFeatureBuilder, ActorFeatures};
pub use corridor::{CorridorDirection, CorridorFeatureBuilder, CorridorFeatures};
pub use market::{MarketFeatureBuilder, MarketFeatures, PressureZone, SpikeSeverity};

pub(crate) fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

pub(crate) fn norm(v: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    clamp01(v / scale)
}

/// Shannon entropy (base 2, normalized to [0,1] by the caller's choice of
/// `max_categories`) of a distribution given as raw weights.
pub(crate) fn shannon_entropy(weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    -weights
        .iter()
        .filter(|&&w| w > 0.0)
        .map(|&w| {
            let p = w / total;
            p * p.log2()
        })
        .sum::<f64>()
}

/// Normalize entropy to [0,1] given the number of distinct categories observed.
pub(crate) fn normalized_entropy(weights: &[f64]) -> f64 {
    let n = weights.iter().filter(|&&w| w > 0.0).count();
    if n <= 1 {
        return 0.0;
    }
    clamp01(shannon_entropy(weights) / (n as f64).log2())
}
