use crate::engine::{FeatureVector, Freshness};
use crate::features::{FIELD_AMOUNT_LAST, FIELD_NIGHT_TXN_COUNT, FIELD_RATE_1H, FIELD_VELOCITY};
use thiserror::Error;

/// Pluggable scoring artifact. The engine knows nothing about models; the
/// gateway hands a resolved vector to whichever scorer is deployed.
pub trait Scorer: Send + Sync {
    /// Fraud probability in `[0, 1]` for the given vector.
    fn score(&self, vector: &FeatureVector) -> f64;
}

/// Linear scorer over registered fields; a stand-in artifact with the same
/// shape as the production ensemble's serving boundary.
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    bias: f64,
    weights: Vec<(&'static str, f64)>,
}

impl Default for WeightedScorer {
    fn default() -> Self {
        Self {
            bias: -3.0,
            weights: vec![
                (FIELD_AMOUNT_LAST, 0.002),
                (FIELD_VELOCITY, 0.01),
                (FIELD_RATE_1H, 0.4),
                (FIELD_NIGHT_TXN_COUNT, 0.15),
            ],
        }
    }
}

impl WeightedScorer {
    pub fn new(bias: f64, weights: Vec<(&'static str, f64)>) -> Self {
        Self { bias, weights }
    }
}

impl Scorer for WeightedScorer {
    fn score(&self, vector: &FeatureVector) -> f64 {
        let logit = self.weights.iter().fold(self.bias, |acc, (field, weight)| {
            acc + weight * vector.fields.get(*field).copied().unwrap_or(0.0)
        });
        1.0 / (1.0 + (-logit).exp())
    }
}

/// Decision handed back to the transaction switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Flag,
    /// The vector was not scorable (COLD or stale beyond tolerance);
    /// route to the conservative rule engine instead of the model.
    RuleFallback,
}

/// Gateway-side policy combining a score with vector freshness. This is
/// the collaborator's half of the contract: the engine reports freshness,
/// the policy decides what a non-LIVE vector means.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    threshold: f64,
    score_stale_fallback: bool,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            score_stale_fallback: true,
        }
    }
}

impl ScoringPolicy {
    pub fn new(threshold: f64, score_stale_fallback: bool) -> Result<Self, ScoringError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ScoringError::InvalidThreshold { threshold });
        }
        Ok(Self {
            threshold,
            score_stale_fallback,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Updates the decision threshold, bounds-checked to `[0, 1]`.
    pub fn set_threshold(&mut self, threshold: f64) -> Result<(), ScoringError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ScoringError::InvalidThreshold { threshold });
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Scores a vector and maps it to a decision.
    pub fn decide(&self, scorer: &dyn Scorer, vector: &FeatureVector) -> Decision {
        match vector.freshness {
            Freshness::Cold => Decision::RuleFallback,
            Freshness::StaleFallback if !self.score_stale_fallback => Decision::RuleFallback,
            Freshness::Live | Freshness::StaleFallback => {
                if scorer.score(vector) >= self.threshold {
                    Decision::Flag
                } else {
                    Decision::Approve
                }
            }
        }
    }
}

/// Errors raised by the scoring boundary.
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("threshold {threshold} must be within [0, 1]")]
    InvalidThreshold { threshold: f64 },
}
