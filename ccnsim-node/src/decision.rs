use std::collections::HashMap;
use std::fmt;

use ccnsim_core::{ChunkId, ObjectName};
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Admission control consulted when a reply is about to be cached.
///
/// Policies only see whether the store is full; they never inspect its
/// contents. A rejection leaves the store untouched.
pub trait DecisionPolicy: fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Decide whether chunk `id`, fetched at `cost`, should be inserted
    fn admit(&mut self, id: ChunkId, cost: f64, store_full: bool) -> bool;
}

/// Popularity estimator used by [`CostAwarePolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// `1 / rank^exponent`, taking the object name as its catalog rank
    #[default]
    ZipfRank,
    /// Share of admission attempts seen for the object so far
    Observed,
}

/// Policy selection as it appears in configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DecisionKind {
    /// Leave a copy everywhere
    #[default]
    Lce,
    Never,
    Fixed {
        probability: f64,
    },
    CostAware {
        #[serde(default = "default_popularity_exponent")]
        popularity_exponent: f64,
        #[serde(default = "default_target_ratio")]
        target_ratio: f64,
        #[serde(default)]
        estimator: EstimatorKind,
    },
}

fn default_popularity_exponent() -> f64 {
    1.0
}

fn default_target_ratio() -> f64 {
    0.1
}

impl DecisionKind {
    /// Instantiate the policy with its own random stream
    pub fn build(&self, seed: u64) -> Box<dyn DecisionPolicy> {
        match self {
            DecisionKind::Lce => Box::new(AlwaysAdmit),
            DecisionKind::Never => Box::new(NeverAdmit),
            DecisionKind::Fixed { probability } => {
                Box::new(FixedProbability::new(*probability, seed))
            }
            DecisionKind::CostAware {
                popularity_exponent,
                target_ratio,
                estimator,
            } => Box::new(CostAwarePolicy::new(
                *popularity_exponent,
                *target_ratio,
                *estimator,
                seed,
            )),
        }
    }
}

/// Admit everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAdmit;

impl DecisionPolicy for AlwaysAdmit {
    fn name(&self) -> &'static str {
        "lce"
    }

    fn admit(&mut self, _id: ChunkId, _cost: f64, _store_full: bool) -> bool {
        true
    }
}

/// Admit nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAdmit;

impl DecisionPolicy for NeverAdmit {
    fn name(&self) -> &'static str {
        "never"
    }

    fn admit(&mut self, _id: ChunkId, _cost: f64, _store_full: bool) -> bool {
        false
    }
}

/// Admit with a constant probability
#[derive(Debug)]
pub struct FixedProbability {
    probability: f64,
    rng: StdRng,
}

impl FixedProbability {
    pub fn new(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DecisionPolicy for FixedProbability {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn admit(&mut self, _id: ChunkId, _cost: f64, _store_full: bool) -> bool {
        self.rng.gen::<f64>() < self.probability
    }
}

/// Incremental arithmetic mean
#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    count: u64,
    mean: f64,
}

impl RunningMean {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }
}

#[derive(Debug, Clone)]
enum PopularityEstimator {
    ZipfRank { exponent: f64 },
    Observed { counts: HashMap<ObjectName, u64>, total: u64 },
}

impl PopularityEstimator {
    fn observe(&mut self, id: ChunkId) {
        if let PopularityEstimator::Observed { counts, total } = self {
            *counts.entry(id.name()).or_insert(0) += 1;
            *total += 1;
        }
    }

    fn estimate(&self, id: ChunkId) -> f64 {
        match self {
            PopularityEstimator::ZipfRank { exponent } => {
                let rank = id.name().max(1) as f64;
                1.0 / rank.powf(*exponent)
            }
            PopularityEstimator::Observed { counts, total } => {
                if *total == 0 {
                    return 0.0;
                }
                counts.get(&id.name()).copied().unwrap_or(0) as f64 / *total as f64
            }
        }
    }
}

/// Probabilistic admission weighted by retrieval cost and popularity.
///
/// While the store is not full every chunk is admitted. Once full, a chunk
/// of weight `w = cost * popularity` is admitted with probability
/// `min(1, target_ratio * w / mean_w)`, where `mean_w` averages every weight
/// the policy has been asked about. Estimators are updated on every call,
/// including the unconditional ones.
#[derive(Debug)]
pub struct CostAwarePolicy {
    target_ratio: f64,
    estimator: PopularityEstimator,
    mean_weight: RunningMean,
    rng: StdRng,
}

impl CostAwarePolicy {
    pub fn new(
        popularity_exponent: f64,
        target_ratio: f64,
        estimator: EstimatorKind,
        seed: u64,
    ) -> Self {
        let estimator = match estimator {
            EstimatorKind::ZipfRank => PopularityEstimator::ZipfRank {
                exponent: popularity_exponent,
            },
            EstimatorKind::Observed => PopularityEstimator::Observed {
                counts: HashMap::new(),
                total: 0,
            },
        };

        Self {
            target_ratio: target_ratio.max(0.0),
            estimator,
            mean_weight: RunningMean::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn content_weight(&self, id: ChunkId, cost: f64) -> f64 {
        cost * self.estimator.estimate(id)
    }

    /// Admission probability of a chunk of the given weight in the current state
    pub fn admission_probability(&self, weight: f64) -> f64 {
        let mean = self.mean_weight.mean;
        if mean <= 0.0 {
            return if weight > 0.0 { 1.0 } else { self.target_ratio.min(1.0) };
        }
        (self.target_ratio * weight / mean).clamp(0.0, 1.0)
    }

    fn decide_with_cache_not_full(&mut self) -> bool {
        true
    }

    fn decide_with_cache_full(&mut self, weight: f64) -> bool {
        let probability = self.admission_probability(weight);
        self.rng.gen::<f64>() < probability
    }
}

impl DecisionPolicy for CostAwarePolicy {
    fn name(&self) -> &'static str {
        "cost_aware"
    }

    fn admit(&mut self, id: ChunkId, cost: f64, store_full: bool) -> bool {
        self.estimator.observe(id);
        let weight = self.content_weight(id, cost);
        self.mean_weight.push(weight);

        let admitted = if store_full {
            self.decide_with_cache_full(weight)
        } else {
            self.decide_with_cache_not_full()
        };

        trace!(
            "Admission for {}: weight {:.4}, mean {:.4}, full {}, admitted {}",
            id,
            weight,
            self.mean_weight.mean,
            store_full,
            admitted
        );
        admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lce_and_never() {
        let mut lce = DecisionKind::Lce.build(0);
        let mut never = DecisionKind::Never.build(0);
        for full in [false, true] {
            assert!(lce.admit(ChunkId::new(1, 0), 1.0, full));
            assert!(!never.admit(ChunkId::new(1, 0), 1.0, full));
        }
    }

    #[test]
    fn test_fixed_probability_bounds() {
        let mut always = FixedProbability::new(1.0, 7);
        let mut none = FixedProbability::new(0.0, 7);
        for n in 0..100 {
            assert!(always.admit(ChunkId::new(n, 0), 1.0, true));
            assert!(!none.admit(ChunkId::new(n, 0), 1.0, true));
        }
    }

    #[test]
    fn test_fixed_probability_is_reproducible() {
        let mut a = FixedProbability::new(0.3, 99);
        let mut b = FixedProbability::new(0.3, 99);
        let run_a: Vec<bool> = (0..50).map(|n| a.admit(ChunkId::new(n, 0), 1.0, true)).collect();
        let run_b: Vec<bool> = (0..50).map(|n| b.admit(ChunkId::new(n, 0), 1.0, true)).collect();
        assert_eq!(run_a, run_b);
    }

    #[test]
    fn test_cost_aware_admits_unconditionally_when_not_full() {
        let mut policy = CostAwarePolicy::new(1.0, 0.0001, EstimatorKind::ZipfRank, 1);
        for n in 1..500 {
            // Tiny weights that would almost never pass the probabilistic gate
            assert!(policy.admit(ChunkId::new(n * 1000, 0), 0.0, false));
        }
    }

    #[test]
    fn test_cost_aware_probability_is_monotonic_in_weight() {
        let mut policy = CostAwarePolicy::new(0.8, 0.5, EstimatorKind::ZipfRank, 3);
        for n in 1..50 {
            policy.admit(ChunkId::new(n, 0), n as f64, true);
        }

        let weights = [0.0, 0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 50.0, 1e6];
        let probabilities: Vec<f64> = weights
            .iter()
            .map(|w| policy.admission_probability(*w))
            .collect();

        for pair in probabilities.windows(2) {
            assert!(pair[0] <= pair[1], "{:?}", probabilities);
        }
        assert_eq!(*probabilities.last().unwrap(), 1.0);
    }

    #[test]
    fn test_zipf_weight_favors_popular_objects() {
        let policy = CostAwarePolicy::new(1.0, 0.1, EstimatorKind::ZipfRank, 0);
        let popular = policy.content_weight(ChunkId::new(1, 0), 2.0);
        let rare = policy.content_weight(ChunkId::new(100, 0), 2.0);

        assert!((popular - 2.0).abs() < 1e-12);
        assert!((rare - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_observed_estimator_tracks_requests() {
        let mut policy = CostAwarePolicy::new(1.0, 0.1, EstimatorKind::Observed, 0);
        for _ in 0..3 {
            policy.admit(ChunkId::new(5, 0), 1.0, false);
        }
        policy.admit(ChunkId::new(6, 0), 1.0, false);

        assert!((policy.content_weight(ChunkId::new(5, 1), 1.0) - 0.75).abs() < 1e-12);
        assert!((policy.content_weight(ChunkId::new(6, 0), 1.0) - 0.25).abs() < 1e-12);
        assert_eq!(policy.content_weight(ChunkId::new(7, 0), 1.0), 0.0);
    }

    #[test]
    fn test_cost_aware_heavy_content_admitted_more_often() {
        let mut policy = CostAwarePolicy::new(1.0, 0.5, EstimatorKind::ZipfRank, 11);
        let mut cheap = 0;
        let mut costly = 0;
        for _ in 0..2000 {
            if policy.admit(ChunkId::new(10, 0), 0.1, true) {
                cheap += 1;
            }
            if policy.admit(ChunkId::new(10, 0), 10.0, true) {
                costly += 1;
            }
        }
        assert!(costly > cheap, "costly {} cheap {}", costly, cheap);
    }

    #[test]
    fn test_decision_kind_from_toml_shape() {
        let kind: DecisionKind = serde_json::from_str(
            r#"{"policy":"cost_aware","popularity_exponent":0.9,"target_ratio":0.2}"#,
        )
        .unwrap();
        assert_eq!(
            kind,
            DecisionKind::CostAware {
                popularity_exponent: 0.9,
                target_ratio: 0.2,
                estimator: EstimatorKind::ZipfRank,
            }
        );

        let fixed: DecisionKind =
            serde_json::from_str(r#"{"policy":"fixed","probability":0.25}"#).unwrap();
        assert_eq!(fixed, DecisionKind::Fixed { probability: 0.25 });
    }
}
