//! Actor-type-to-actor-type corridor features (e.g. fund -> exchange flow).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::snapshot::ActorType;
use crate::transfer::Transfer;

use super::{clamp01, normalized_entropy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorridorDirection {
    FromTo,
    ToFrom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorridorFeatures {
    pub from_type: ActorType,
    pub to_type: ActorType,
    pub direction: CorridorDirection,
    pub persistence_days: f64,
    pub repeat_rate: f64,
    pub net_flow_slope: f64,
    pub entropy: f64,
    pub concentration_index: f64,
    pub top_actor_share: f64,
    pub new_actor_rate: f64,
    pub quality_score: f64,
}

pub struct CorridorFeatureBuilder;

impl CorridorFeatureBuilder {
    /// `daily_buckets` is one `(day_index, transfers observed that day)` entry
    /// per day in the lookback window, oldest first, already filtered to
    /// transfers moving `from_type -> to_type` (or the reverse, per
    /// `direction`). `active_days` is how many of those days saw at least one
    /// transfer, used for persistence.
    pub fn build(
        from_type: ActorType,
        to_type: ActorType,
        direction: CorridorDirection,
        daily_buckets: &[(u32, Vec<Transfer>)],
        active_days: u32,
        lookback_days: u32,
        known_actors_before: &HashSet<String>,
    ) -> CorridorFeatures {
        let lookback = lookback_days.max(1) as f64;
        let persistence_days = active_days.min(lookback_days) as f64;

        let all_transfers: Vec<&Transfer> = daily_buckets.iter().flat_map(|(_, ts)| ts).collect();

        let mut actor_participation: HashMap<String, u32> = HashMap::new();
        let mut actor_volume: HashMap<String, f64> = HashMap::new();
        let mut new_actors: HashSet<String> = HashSet::new();

        let mut daily_net: Vec<(f64, f64)> = Vec::with_capacity(daily_buckets.len());
        for (day_index, transfers) in daily_buckets {
            let mut day_net = 0.0;
            for t in transfers {
                *actor_participation.entry(t.from.actor_id.clone()).or_default() += 1;
                *actor_volume.entry(t.from.actor_id.clone()).or_default() += t.amount_usd;
                day_net += t.amount_usd;
                if !known_actors_before.contains(&t.from.actor_id) {
                    new_actors.insert(t.from.actor_id.clone());
                }
            }
            daily_net.push((*day_index as f64, day_net));
        }

        let repeat_rate = if actor_participation.is_empty() {
            0.0
        } else {
            let repeaters = actor_participation.values().filter(|&&c| c > 1).count();
            repeaters as f64 / actor_participation.len() as f64
        };

        let net_flow_slope = linear_regression_slope(&daily_net);

        let volumes: Vec<f64> = actor_volume.values().copied().collect();
        let entropy = normalized_entropy(&volumes);
        let concentration_index = clamp01(1.0 - entropy);

        let total_volume: f64 = volumes.iter().sum();
        let top_actor_share = if total_volume > 0.0 {
            volumes.iter().cloned().fold(0.0, f64::max) / total_volume
        } else {
            0.0
        };

        let new_actor_rate = if all_transfers.is_empty() {
            0.0
        } else {
            new_actors.len() as f64 / actor_participation.len().max(1) as f64
        };

        let quality_score = clamp01(
            0.25 * clamp01(persistence_days / lookback)
                + 0.25 * clamp01(1.0 - top_actor_share)
                + 0.25 * repeat_rate
                + 0.25 * entropy,
        );

        CorridorFeatures {
            from_type,
            to_type,
            direction,
            persistence_days,
            repeat_rate,
            net_flow_slope,
            entropy,
            concentration_index,
            top_actor_share,
            new_actor_rate,
            quality_score,
        }
    }
}

/// Ordinary least squares slope of `y` over `x`, zero if fewer than two
/// distinct points are present.
fn linear_regression_slope(points: &[(f64, f64)]) -> f64 {
    let n = points.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}
