//! Exploration strategies.
//!
//! An exploration strategy is a pure choice function over an action → value
//! mapping; the engine never relies on its internals beyond totality on
//! non-empty mappings. Strategies are generic over the action key so that
//! the same implementations serve both the generalized-action learners and
//! the plain tabular baselines.

use rand::Rng;
use std::collections::BTreeMap;

/// A choice function from an action → value mapping to an action.
///
/// `choose` must return `Some` for any non-empty mapping and `None` only for
/// an empty one. Implementations may keep internal decay counters; the
/// engine's correctness never depends on them.
pub trait ExplorationStrategy<A: Clone + Ord> {
    /// Chooses one action from the mapping.
    fn choose(&mut self, options: &BTreeMap<A, f64>) -> Option<A>;

    /// Called at the beginning of each episode.
    fn reset_episode(&mut self) {}

    /// Called at the beginning of the whole run.
    fn reset_all(&mut self) {}
}

/// Index of the greatest value, breaking ties uniformly at random by
/// reservoir sampling.
fn argmax_reservoir<R: Rng>(values: impl Iterator<Item = f64>, rng: &mut R) -> Option<usize> {
    let mut best = f64::NEG_INFINITY;
    let mut best_idx = None;
    let mut ties = 0u32;
    for (i, v) in values.enumerate() {
        if v > best {
            best = v;
            best_idx = Some(i);
            ties = 1;
        } else if v == best {
            ties += 1;
            if rng.random::<f64>() < 1.0 / f64::from(ties) {
                best_idx = Some(i);
            }
        }
    }
    best_idx
}

/// Epsilon-greedy exploration: with probability epsilon, pick uniformly at
/// random; otherwise pick a greatest-value action (ties broken at random).
/// Epsilon decays multiplicatively after every choice when a decay rate is
/// set.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    epsilon_initial: f64,
    epsilon: f64,
    decay_rate: f64,
}

impl EpsilonGreedy {
    /// Creates an epsilon-greedy strategy. Set `decay_rate` to 0.0 to keep
    /// epsilon constant.
    pub fn new(epsilon: f64, decay_rate: f64) -> Self {
        Self {
            epsilon_initial: epsilon,
            epsilon,
            decay_rate,
        }
    }

    /// A purely greedy strategy (epsilon 0, no decay).
    pub fn greedy() -> Self {
        Self::new(0.0, 0.0)
    }

    /// The current epsilon value.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl<A: Clone + Ord> ExplorationStrategy<A> for EpsilonGreedy {
    fn choose(&mut self, options: &BTreeMap<A, f64>) -> Option<A> {
        if options.is_empty() {
            return None;
        }
        let mut rng = rand::rng();

        let idx = if rng.random::<f64>() < self.epsilon {
            rng.random_range(0..options.len())
        } else {
            argmax_reservoir(options.values().copied(), &mut rng)?
        };

        if self.decay_rate > 0.0 {
            self.epsilon *= self.decay_rate;
        }

        options.keys().nth(idx).cloned()
    }

    fn reset_all(&mut self) {
        self.epsilon = self.epsilon_initial;
    }
}

/// Boltzmann (softmax) exploration: each action is sampled with probability
/// proportional to `exp(value / temperature)`.
#[derive(Debug, Clone)]
pub struct Boltzmann {
    temperature: f64,
}

impl Boltzmann {
    /// Creates a Boltzmann strategy with the given temperature (> 0).
    pub fn new(temperature: f64) -> Self {
        Self { temperature }
    }
}

impl<A: Clone + Ord> ExplorationStrategy<A> for Boltzmann {
    fn choose(&mut self, options: &BTreeMap<A, f64>) -> Option<A> {
        if options.is_empty() {
            return None;
        }
        let mut rng = rand::rng();

        // shift by the maximum value so the exponentials stay finite
        let max = options
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = options
            .values()
            .map(|v| ((v - max) / self.temperature).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        let mut r = rng.random::<f64>() * total;
        let mut idx = weights.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if r < *w {
                idx = i;
                break;
            }
            r -= w;
        }

        options.keys().nth(idx).cloned()
    }
}
