//! Per-actor features, bucketed every 15 minutes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::snapshot::ActorType;
use crate::transfer::Transfer;

use super::{clamp01, norm, normalized_entropy};

const VOLUME_SCALE_USD: f64 = 5_000_000.0;
const COUNTERPARTY_SCALE: usize = 50;
const WHALE_SCALE_USD: f64 = 10_000_000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorFeatures {
    pub network: String,
    pub bucket_timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub flow_usd: f64,
    pub unique_counterparties: usize,
    pub fan_in: u64,
    pub fan_out: u64,
    pub outgoing_entropy: f64,
    pub influence_score: f64,
    pub whale_score: f64,
    pub noise_score: f64,
}

pub struct ActorFeatureBuilder;

impl ActorFeatureBuilder {
    /// `(network, bucket_timestamp)` together form the idempotency key:
    /// calling this twice with the same transfers and bucket produces byte-
    /// identical output.
    pub fn build(
        network: &str,
        bucket_timestamp: DateTime<Utc>,
        transfers: &[Transfer],
        role_of: impl Fn(&str) -> ActorType + Sync,
    ) -> HashMap<String, ActorFeatures> {
        let mut fan_in: HashMap<String, u64> = HashMap::new();
        let mut fan_out: HashMap<String, u64> = HashMap::new();
        let mut inflow: HashMap<String, f64> = HashMap::new();
        let mut outflow: HashMap<String, f64> = HashMap::new();
        let mut counterparties: HashMap<String, std::collections::HashSet<String>> =
            HashMap::new();
        let mut outgoing_by_counterparty: HashMap<String, HashMap<String, f64>> = HashMap::new();

        for t in transfers {
            *fan_out.entry(t.from.actor_id.clone()).or_default() += 1;
            *fan_in.entry(t.to.actor_id.clone()).or_default() += 1;
            *outflow.entry(t.from.actor_id.clone()).or_default() += t.amount_usd;
            *inflow.entry(t.to.actor_id.clone()).or_default() += t.amount_usd;
            counterparties
                .entry(t.from.actor_id.clone())
                .or_default()
                .insert(t.to.actor_id.clone());
            counterparties
                .entry(t.to.actor_id.clone())
                .or_default()
                .insert(t.from.actor_id.clone());
            *outgoing_by_counterparty
                .entry(t.from.actor_id.clone())
                .or_default()
                .entry(t.to.actor_id.clone())
                .or_default() += t.amount_usd;
        }

        let mut actor_ids: std::collections::HashSet<String> = std::collections::HashSet::new();
        actor_ids.extend(fan_in.keys().cloned());
        actor_ids.extend(fan_out.keys().cloned());

        actor_ids
            .into_par_iter()
            .map(|actor_id| {
                let flow_usd = inflow.get(&actor_id).copied().unwrap_or(0.0)
                    + outflow.get(&actor_id).copied().unwrap_or(0.0);
                let unique_counterparties = counterparties
                    .get(&actor_id)
                    .map(|s| s.len())
                    .unwrap_or(0);
                let outgoing_weights: Vec<f64> = outgoing_by_counterparty
                    .get(&actor_id)
                    .map(|m| m.values().copied().collect())
                    .unwrap_or_default();
                let outgoing_entropy = normalized_entropy(&outgoing_weights);

                let role_boost = if role_of(&actor_id).is_exchange_or_mm() {
                    0.10
                } else {
                    0.0
                };
                let norm_vol = norm(flow_usd, VOLUME_SCALE_USD);
                let norm_counterparties = norm(unique_counterparties as f64, COUNTERPARTY_SCALE as f64);
                let influence_score =
                    clamp01(0.55 * norm_vol + 0.35 * norm_counterparties + role_boost);

                let whale_score = norm(flow_usd, WHALE_SCALE_USD);
                // many counterparties, little volume per counterparty => noisy
                let avg_per_counterparty = if unique_counterparties > 0 {
                    flow_usd / unique_counterparties as f64
                } else {
                    0.0
                };
                let noise_score = clamp01(norm_counterparties * (1.0 - norm(avg_per_counterparty, VOLUME_SCALE_USD / 10.0)));

                ActorFeatures {
                    network: network.to_string(),
                    bucket_timestamp,
                    actor_id: actor_id.clone(),
                    flow_usd,
                    unique_counterparties,
                    fan_in: fan_in.get(&actor_id).copied().unwrap_or(0),
                    fan_out: fan_out.get(&actor_id).copied().unwrap_or(0),
                    outgoing_entropy,
                    influence_score,
                    whale_score,
                    noise_score,
                }
            })
            .map(|f| (f.actor_id.clone(), f))
            .collect()
    }
}
