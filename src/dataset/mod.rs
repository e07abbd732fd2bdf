//! Joins snapshots, outcomes, trend validations and attributions into
//! training samples behind quality gates. Read-only with respect to model
//! training itself: only the sample-building contract lives here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::outcome::{AttributionOutcomeLink, Horizon, TrendValidation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftLevel {
    Normal,
    Elevated,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildMode {
    Incremental,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub has_snapshot: bool,
    pub has_trend_validation: bool,
    pub horizon_trend_count: usize,
    pub attribution_link_count: usize,
    pub drift_level: DriftLevel,
    pub train_eligible: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSample {
    pub sample_id: String,
    pub snapshot_id: String,
    pub horizon: Horizon,
    pub features: HashMap<String, f64>,
    pub labels: HashMap<String, String>,
    pub quality: QualityReport,
}

pub struct DatasetBuilder {
    include_critical_drift: bool,
}

impl DatasetBuilder {
    pub fn new(include_critical_drift: bool) -> Self {
        Self { include_critical_drift }
    }

    /// `materialized` is the set of sample ids already persisted, consulted
    /// only in `BuildMode::Incremental` so a repeat run doesn't redo work.
    pub fn build_sample(
        &self,
        snapshot_id: &str,
        horizon: Horizon,
        features: HashMap<String, f64>,
        trend_validations: &[TrendValidation],
        attribution_links: &[AttributionOutcomeLink],
        drift_level: DriftLevel,
        mode: BuildMode,
        materialized: &impl Fn(&str) -> bool,
    ) -> Option<LearningSample> {
        let sample_id = format!("{snapshot_id}:{}", horizon_key(horizon));

        if mode == BuildMode::Incremental && materialized(&sample_id) {
            return None;
        }

        let has_snapshot = !snapshot_id.is_empty();
        let matching_trends: Vec<&TrendValidation> = trend_validations
            .iter()
            .filter(|t| t.horizon == horizon)
            .collect();
        let has_trend_validation = !matching_trends.is_empty();
        let horizon_trend_count = matching_trends.len();
        let matching_links: Vec<&AttributionOutcomeLink> = attribution_links
            .iter()
            .filter(|l| l.horizon == horizon)
            .collect();
        let attribution_link_count = matching_links.len();

        let mut reasons = Vec::new();
        let hard_gates_pass = has_snapshot
            && has_trend_validation
            && horizon_trend_count >= 1
            && attribution_link_count >= 1;
        if !has_snapshot {
            reasons.push("snapshot missing".to_string());
        }
        if !has_trend_validation {
            reasons.push("no trend validation for horizon".to_string());
        }
        if attribution_link_count == 0 {
            reasons.push("no attribution link for horizon".to_string());
        }

        let soft_gate_pass = drift_level != DriftLevel::Critical || self.include_critical_drift;
        if drift_level == DriftLevel::Critical && !self.include_critical_drift {
            reasons.push("critical drift excludes this sample from training".to_string());
        }

        let train_eligible = hard_gates_pass && soft_gate_pass;

        let labels: HashMap<String, String> = matching_trends
            .iter()
            .map(|t| (horizon_key(t.horizon).to_string(), format!("{:?}", t.label)))
            .collect();

        Some(LearningSample {
            sample_id,
            snapshot_id: snapshot_id.to_string(),
            horizon,
            features,
            labels,
            quality: QualityReport {
                has_snapshot,
                has_trend_validation,
                horizon_trend_count,
                attribution_link_count,
                drift_level,
                train_eligible,
                reasons,
            },
        })
    }
}

fn horizon_key(horizon: Horizon) -> &'static str {
    match horizon {
        Horizon::OneDay => "1d",
        Horizon::SevenDay => "7d",
        Horizon::ThirtyDay => "30d",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::TrendLabel;

    fn trend(horizon: Horizon) -> TrendValidation {
        TrendValidation {
            entity_addr: "0xabc".to_string(),
            horizon,
            label: TrendLabel::Up,
        }
    }

    fn link(horizon: Horizon) -> AttributionOutcomeLink {
        AttributionOutcomeLink {
            entity_addr: "0xabc".to_string(),
            horizon,
            contributing_signal_keys: vec![],
        }
    }

    #[test]
    fn all_gates_pass_yields_train_eligible() {
        let builder = DatasetBuilder::new(false);
        let sample = builder
            .build_sample(
                "snap1",
                Horizon::SevenDay,
                HashMap::new(),
                &[trend(Horizon::SevenDay)],
                &[link(Horizon::SevenDay)],
                DriftLevel::Normal,
                BuildMode::Full,
                &|_| false,
            )
            .unwrap();
        assert!(sample.quality.train_eligible);
    }

    #[test]
    fn missing_attribution_link_fails_hard_gate() {
        let builder = DatasetBuilder::new(false);
        let sample = builder
            .build_sample(
                "snap1",
                Horizon::SevenDay,
                HashMap::new(),
                &[trend(Horizon::SevenDay)],
                &[],
                DriftLevel::Normal,
                BuildMode::Full,
                &|_| false,
            )
            .unwrap();
        assert!(!sample.quality.train_eligible);
    }

    #[test]
    fn critical_drift_excluded_unless_flag_set() {
        let builder = DatasetBuilder::new(false);
        let sample = builder
            .build_sample(
                "snap1",
                Horizon::SevenDay,
                HashMap::new(),
                &[trend(Horizon::SevenDay)],
                &[link(Horizon::SevenDay)],
                DriftLevel::Critical,
                BuildMode::Full,
                &|_| false,
            )
            .unwrap();
        assert!(!sample.quality.train_eligible);

        let builder_allowing = DatasetBuilder::new(true);
        let sample2 = builder_allowing
            .build_sample(
                "snap1",
                Horizon::SevenDay,
                HashMap::new(),
                &[trend(Horizon::SevenDay)],
                &[link(Horizon::SevenDay)],
                DriftLevel::Critical,
                BuildMode::Full,
                &|_| false,
            )
            .unwrap();
        assert!(sample2.quality.train_eligible);
    }

    #[test]
    fn incremental_mode_skips_materialized_samples() {
        let builder = DatasetBuilder::new(false);
        let sample = builder.build_sample(
            "snap1",
            Horizon::SevenDay,
            HashMap::new(),
            &[trend(Horizon::SevenDay)],
            &[link(Horizon::SevenDay)],
            DriftLevel::Normal,
            BuildMode::Incremental,
            &|_| true,
        );
        assert!(sample.is_none());
    }
}
