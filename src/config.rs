//! Shared learning parameters.

use serde::{Deserialize, Serialize};

/// Temporal-difference parameters shared by all tabular learners.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LearningParams {
    /// The learning rate (alpha), how much new information overrides old.
    pub alpha: f64,
    /// The discount factor (gamma), the weight of future rewards.
    pub gamma: f64,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            gamma: 0.9,
        }
    }
}

impl LearningParams {
    /// Creates parameters with explicit alpha and gamma.
    pub fn new(alpha: f64, gamma: f64) -> Self {
        Self { alpha, gamma }
    }

    /// Sets the learning rate.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the discount factor.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }
}
