//! Engine configuration surface.
//!
//! `Config::from_env` shape: everything has a documented default and can be
//! overridden by environment variable, with an optional checked-in TOML
//! file for operators who want one.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::snapshot::Window;

/// Confidence scorer weights. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub coverage: f64,
    pub actors: f64,
    pub flow: f64,
    pub temporal: f64,
    pub evidence: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            coverage: 0.30,
            actors: 0.25,
            flow: 0.20,
            temporal: 0.15,
            evidence: 0.10,
        }
    }
}

/// Confidence label thresholds. Must be strictly increasing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            low: 40.0,
            medium: 60.0,
            high: 80.0,
        }
    }
}

/// Per-window rule thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuleThresholds {
    pub min_density: u64,
    pub high_density: u64,
    pub min_weight: f64,
    pub min_confidence: f64,
    pub coverage_required: f64,
    pub min_prev_density: u64,
    pub min_spike_ratio: f64,
    pub high_spike_ratio: f64,
    pub min_imbalance_ratio: f64,
    pub min_net_flow_usd: f64,
    pub min_total_flow_usd: f64,
    pub min_bridge_sync: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            min_density: 10,
            high_density: 40,
            min_weight: 0.5,
            min_confidence: 0.7,
            coverage_required: 0.6,
            min_prev_density: 5,
            min_spike_ratio: 0.5,
            high_spike_ratio: 1.5,
            min_imbalance_ratio: 0.6,
            min_net_flow_usd: 50_000.0,
            min_total_flow_usd: 100_000.0,
            min_bridge_sync: 0.7,
        }
    }
}

/// Ranking engine weights and caps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankingWeights {
    pub market_cap: f64,
    pub volume: f64,
    pub momentum: f64,
    pub engine_confidence: f64,
    pub actor_signal: f64,
    pub engine_confidence_cap: f64,
    pub actor_signal_cap: f64,
    pub buy_score_min: f64,
    pub buy_confidence_min: f64,
    pub buy_risk_max: f64,
    pub sell_score_max: f64,
    pub sell_risk_min: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            market_cap: 0.20,
            volume: 0.15,
            momentum: 0.15,
            engine_confidence: 0.30,
            actor_signal: 0.20,
            engine_confidence_cap: 15.0,
            actor_signal_cap: 20.0,
            buy_score_min: 60.0,
            buy_confidence_min: 50.0,
            buy_risk_max: 45.0,
            sell_score_max: 40.0,
            sell_risk_min: 60.0,
        }
    }
}

/// Cluster-confirmation policy for the penalty applied when a single
/// cluster dominates the evidence behind a candidate signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterPolicy {
    pub min_clusters: usize,
    pub max_dominance: f64,
    pub require_source_diversity: bool,
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self {
            min_clusters: 2,
            max_dominance: 0.65,
            require_source_diversity: true,
        }
    }
}

/// Lifecycle N/M run counts and decay half-life.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    pub runs_to_cooldown: u32,
    pub runs_to_resolve: u32,
    pub min_confidence_to_activate: f64,
    pub decay_half_life_days: f64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            runs_to_cooldown: 3,
            runs_to_resolve: 6,
            min_confidence_to_activate: 40.0,
            decay_half_life_days: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database_path: String,
    pub max_signals_per_run: usize,
    pub call_timeout: std::time::Duration,
    pub confidence_weights: ConfidenceWeights,
    pub confidence_thresholds: ConfidenceThresholds,
    #[serde(skip, default = "default_rule_thresholds")]
    pub rule_thresholds: HashMap<Window, RuleThresholds>,
    pub ranking_weights: RankingWeights,
    pub cluster_policy: ClusterPolicy,
    pub lifecycle_policy: LifecyclePolicy,
    pub include_critical_drift: bool,
}

fn default_rule_thresholds() -> HashMap<Window, RuleThresholds> {
    [
        Window::H1,
        Window::H24,
        Window::D7,
        Window::D30,
    ]
    .into_iter()
    .map(|w| (w, RuleThresholds::default()))
    .collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: "./signal_engine.db".to_string(),
            max_signals_per_run: 50,
            call_timeout: std::time::Duration::from_secs(30),
            confidence_weights: ConfidenceWeights::default(),
            confidence_thresholds: ConfidenceThresholds::default(),
            rule_thresholds: default_rule_thresholds(),
            ranking_weights: RankingWeights::default(),
            cluster_policy: ClusterPolicy::default(),
            lifecycle_policy: LifecyclePolicy::default(),
            include_critical_drift: false,
        }
    }
}

impl EngineConfig {
    /// Build configuration from environment variables, falling back to documented defaults.
    /// Mirrors `models::Config::from_env` in the codebase this engine grew out of.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut cfg = Self::default();

        if let Ok(path) = env::var("DATABASE_PATH") {
            cfg.database_path = path;
        }
        if let Some(v) = env_parse::<usize>("MAX_SIGNALS_PER_RUN") {
            cfg.max_signals_per_run = v;
        }
        if let Some(v) = env_parse::<u64>("CALL_TIMEOUT_SECS") {
            cfg.call_timeout = std::time::Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<f64>("CONFIDENCE_HIGH_THRESHOLD") {
            cfg.confidence_thresholds.high = v;
        }
        if let Some(v) = env_parse::<f64>("CLUSTER_MAX_DOMINANCE") {
            cfg.cluster_policy.max_dominance = v;
        }
        if let Some(v) = env_parse::<u32>("LIFECYCLE_RUNS_TO_COOLDOWN") {
            cfg.lifecycle_policy.runs_to_cooldown = v;
        }
        if let Some(v) = env_parse::<u32>("LIFECYCLE_RUNS_TO_RESOLVE") {
            cfg.lifecycle_policy.runs_to_resolve = v;
        }
        if let Some(v) = env_parse::<f64>("LIFECYCLE_DECAY_HALF_LIFE_DAYS") {
            cfg.lifecycle_policy.decay_half_life_days = v;
        }
        if let Ok(v) = env::var("INCLUDE_CRITICAL_DRIFT") {
            cfg.include_critical_drift = matches!(v.as_str(), "1" | "true" | "TRUE" | "on");
        }

        cfg
    }

    /// Load from a checked-in TOML config file, falling back to defaults for anything unset.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)?;
        Ok(cfg)
    }

    pub fn thresholds_for(&self, window: Window) -> RuleThresholds {
        self.rule_thresholds
            .get(&window)
            .copied()
            .unwrap_or_default()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
