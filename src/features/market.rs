//! Exchange/market-maker buy/sell pressure features.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decay::half_life_decay;

const SPIKE_MEDIUM: f64 = 0.15;
const SPIKE_HIGH: f64 = 0.30;
const ZONE_NEUTRAL_BAND: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureZone {
    Buying,
    Selling,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpikeSeverity {
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketFeatures {
    pub actor_id: String,
    pub pressure_5m: f64,
    pub pressure_1h: f64,
    pub pressure_1d: f64,
    pub spike: Option<SpikeSeverity>,
    pub zone: PressureZone,
    pub zone_persistence_days: f64,
    pub decay_factor: f64,
}

pub struct MarketFeatureBuilder;

impl MarketFeatureBuilder {
    /// `flows_*` are `(inflow_usd, outflow_usd)` pairs for each window.
    /// `zone_started_at` is the timestamp the actor's current pressure zone
    /// was first observed; `None` means this is the first bucket seen for
    /// the actor, so persistence is zero and decay is full strength.
    pub fn build(
        actor_id: &str,
        flows_5m: (f64, f64),
        flows_1h: (f64, f64),
        flows_1d: (f64, f64),
        zone_started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        half_life_days: f64,
    ) -> MarketFeatures {
        let pressure_5m = pressure(flows_5m);
        let pressure_1h = pressure(flows_1h);
        let pressure_1d = pressure(flows_1d);

        let delta = (pressure_5m - pressure_1h).abs();
        let spike = if delta >= SPIKE_HIGH {
            Some(SpikeSeverity::High)
        } else if delta >= SPIKE_MEDIUM {
            Some(SpikeSeverity::Medium)
        } else {
            None
        };

        let zone = classify_zone(pressure_1h);

        let zone_persistence_days = zone_started_at
            .map(|started| (now - started).num_seconds().max(0) as f64 / 86_400.0)
            .unwrap_or(0.0);
        let decay_factor = half_life_decay(zone_persistence_days, half_life_days);

        MarketFeatures {
            actor_id: actor_id.to_string(),
            pressure_5m,
            pressure_1h,
            pressure_1d,
            spike,
            zone,
            zone_persistence_days,
            decay_factor,
        }
    }
}

fn pressure((inflow, outflow): (f64, f64)) -> f64 {
    let total = inflow + outflow;
    if total <= 0.0 {
        return 0.0;
    }
    ((inflow - outflow) / total).clamp(-1.0, 1.0)
}

fn classify_zone(pressure_1h: f64) -> PressureZone {
    if pressure_1h > ZONE_NEUTRAL_BAND {
        PressureZone::Buying
    } else if pressure_1h < -ZONE_NEUTRAL_BAND {
        PressureZone::Selling
    } else {
        PressureZone::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_inflow_is_max_buying_pressure() {
        let p = pressure((100.0, 0.0));
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pure_outflow_is_max_selling_pressure() {
        let p = pressure((0.0, 100.0));
        assert!((p + 1.0).abs() < 1e-9);
    }

    #[test]
    fn balanced_flow_is_neutral() {
        let p = pressure((50.0, 50.0));
        assert!(p.abs() < 1e-9);
    }

    #[test]
    fn large_divergence_from_hourly_triggers_high_spike() {
        let f = MarketFeatureBuilder::build(
            "binance",
            (100.0, 0.0),
            (50.0, 50.0),
            (50.0, 50.0),
            None,
            Utc::now(),
            3.0,
        );
        assert_eq!(f.spike, Some(SpikeSeverity::High));
    }

    #[test]
    fn no_zone_history_gives_full_strength_decay() {
        let f = MarketFeatureBuilder::build(
            "binance",
            (60.0, 40.0),
            (60.0, 40.0),
            (60.0, 40.0),
            None,
            Utc::now(),
            3.0,
        );
        assert_eq!(f.zone_persistence_days, 0.0);
        assert_eq!(f.decay_factor, 1.0);
    }

    #[test]
    fn old_zone_decays() {
        let now = Utc::now();
        let started = now - chrono::Duration::days(3);
        let f = MarketFeatureBuilder::build(
            "binance",
            (60.0, 40.0),
            (60.0, 40.0),
            (60.0, 40.0),
            Some(started),
            now,
            3.0,
        );
        assert!((f.decay_factor - 0.5).abs() < 1e-6);
    }
}
