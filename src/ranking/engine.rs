use crate::config::RankingWeights;

use super::{Bucket, BucketTransition, Ranking, RankingInput, TransitionReason};

const STABILITY_PENALTY_PER_FLIP: f64 = 3.0;
const NEUTRAL: f64 = 50.0;

pub struct RankingEngine {
    weights: RankingWeights,
}

impl RankingEngine {
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    /// Ranks every input entity and, for any whose bucket differs from its
    /// previous bucket, returns a `BucketTransition` to append to the audit log.
    pub fn rank_all(
        &self,
        inputs: &[RankingInput],
        previous_buckets: impl Fn(&str) -> Option<Bucket>,
    ) -> (Vec<Ranking>, Vec<BucketTransition>) {
        let mut rankings = Vec::with_capacity(inputs.len());
        let mut transitions = Vec::new();

        for input in inputs {
            let ranking = self.rank_one(input);
            let previous = previous_buckets(&input.entity_addr);
            if previous != Some(ranking.bucket) {
                transitions.push(BucketTransition {
                    entity_addr: input.entity_addr.clone(),
                    from: previous,
                    to: ranking.bucket,
                    reason: self.transition_reason(input, previous, ranking.bucket),
                });
            }
            rankings.push(ranking);
        }

        (rankings, transitions)
    }

    fn rank_one(&self, input: &RankingInput) -> Ranking {
        let w = &self.weights;

        let engine_confidence_effective =
            NEUTRAL + (input.engine_confidence - NEUTRAL).clamp(-w.engine_confidence_cap, w.engine_confidence_cap);
        let actor_signal_effective =
            (input.actor_signal_score).clamp(-w.actor_signal_cap, w.actor_signal_cap);

        let stability_penalty = input.recent_bucket_flips as f64 * STABILITY_PENALTY_PER_FLIP;

        let engine_contribution = w.engine_confidence * engine_confidence_effective;
        let composite = w.market_cap * input.market_cap_score
            + w.volume * input.volume_score
            + w.momentum * input.momentum_score
            + engine_contribution
            + w.actor_signal * (NEUTRAL + actor_signal_effective)
            - stability_penalty;

        let mut bucket = self.bucket_for(input, composite);

        if bucket == Bucket::Buy {
            let score_without_engine = composite - engine_contribution;
            if score_without_engine < w.buy_score_min {
                bucket = Bucket::Watch;
            }
        }

        Ranking {
            entity_addr: input.entity_addr.clone(),
            chain_id: input.chain_id.clone(),
            composite_score: composite,
            confidence: input.engine_confidence,
            risk_score: input.risk_score,
            bucket,
            stability_penalty,
        }
    }

    fn bucket_for(&self, input: &RankingInput, composite: f64) -> Bucket {
        let w = &self.weights;
        if input.conflict_lock {
            return Bucket::Watch;
        }
        if composite >= w.buy_score_min
            && input.engine_confidence >= w.buy_confidence_min
            && input.risk_score <= w.buy_risk_max
        {
            return Bucket::Buy;
        }
        if composite < w.sell_score_max || input.risk_score >= w.sell_risk_min {
            return Bucket::Sell;
        }
        Bucket::Watch
    }

    fn transition_reason(
        &self,
        input: &RankingInput,
        previous: Option<Bucket>,
        to: Bucket,
    ) -> TransitionReason {
        if input.conflict_lock {
            return TransitionReason::ConflictLock;
        }
        if input.risk_score >= self.weights.sell_risk_min {
            return TransitionReason::RiskSpike;
        }
        match (previous, to) {
            (Some(Bucket::Buy), Bucket::Watch) => TransitionReason::EngineSafetyDowngrade,
            (_, Bucket::Buy) => TransitionReason::ScoreIncrease,
            (_, Bucket::Sell) => TransitionReason::ScoreDecrease,
            _ if input.actor_signal_score > 0.0 => TransitionReason::ActorSignalPositive,
            _ if input.actor_signal_score < 0.0 => TransitionReason::ActorSignalNegative,
            _ => TransitionReason::ScoreDecrease,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> RankingInput {
        RankingInput {
            entity_addr: "0xabc".to_string(),
            chain_id: "eth".to_string(),
            market_cap_score: 70.0,
            volume_score: 70.0,
            momentum_score: 70.0,
            engine_confidence: 70.0,
            actor_signal_score: 10.0,
            risk_score: 20.0,
            conflict_lock: false,
            recent_bucket_flips: 0,
        }
    }

    #[test]
    fn strong_entity_lands_in_buy() {
        let engine = RankingEngine::new(RankingWeights::default());
        let (rankings, _) = engine.rank_all(&[base_input()], |_| None);
        assert_eq!(rankings[0].bucket, Bucket::Buy);
    }

    #[test]
    fn conflict_lock_forces_watch() {
        let mut input = base_input();
        input.conflict_lock = true;
        let engine = RankingEngine::new(RankingWeights::default());
        let (rankings, transitions) = engine.rank_all(&[input], |_| None);
        assert_eq!(rankings[0].bucket, Bucket::Watch);
        assert_eq!(transitions[0].reason, TransitionReason::ConflictLock);
    }

    #[test]
    fn high_risk_forces_sell() {
        let mut input = base_input();
        input.risk_score = 80.0;
        let engine = RankingEngine::new(RankingWeights::default());
        let (rankings, _) = engine.rank_all(&[input], |_| None);
        assert_eq!(rankings[0].bucket, Bucket::Sell);
    }

    #[test]
    fn engine_confidence_alone_cannot_rescue_a_sell_into_buy() {
        let mut input = base_input();
        input.market_cap_score = 10.0;
        input.volume_score = 10.0;
        input.momentum_score = 10.0;
        input.actor_signal_score = -20.0;
        input.engine_confidence = 100.0;
        let engine = RankingEngine::new(RankingWeights::default());
        let (rankings, _) = engine.rank_all(&[input], |_| None);
        assert_ne!(rankings[0].bucket, Bucket::Buy);
    }

    #[test]
    fn no_bucket_change_emits_no_transition() {
        let engine = RankingEngine::new(RankingWeights::default());
        let (_, transitions) = engine.rank_all(&[base_input()], |_| Some(Bucket::Buy));
        assert!(transitions.is_empty());
    }
}
