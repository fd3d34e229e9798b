//! The generalized value table.
//!
//! Maps a `GeneralizedState` to a mapping of `GeneralizedAction` → learned
//! value, with a parallel reward-history table used by the abstraction-growth
//! rules. Entries are created lazily the first time a state or state/action
//! pair is referenced and are never removed, so growth is monotonic for the
//! lifetime of a run.
//!
//! `BTreeMap` keeps every scan over the table in a fixed key order, which the
//! generalization search relies on for deterministic tie-breaking.

use crate::joint::{GeneralizedAction, GeneralizedState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sparse, lazily-grown two-level value table.
///
/// Invariant: a `(state, action)` pair has a value entry exactly when it has
/// a reward-history entry. The only mutation entry points are
/// [`ValueTable::ensure_state`], [`ValueTable::ensure_entry`], and
/// [`ValueTable::apply_td`], all of which preserve the invariant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueTable {
    values: BTreeMap<GeneralizedState, BTreeMap<GeneralizedAction, f64>>,
    rewards: BTreeMap<GeneralizedState, BTreeMap<GeneralizedAction, Vec<f64>>>,
}

impl ValueTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a state row exists, seeding it with the given actions at
    /// value 0.0 and an empty reward history each.
    ///
    /// Seeding actions passed for an already-known state are added only if
    /// absent; existing entries are never reset.
    pub fn ensure_state<I>(&mut self, state: &GeneralizedState, seed_actions: I)
    where
        I: IntoIterator<Item = GeneralizedAction>,
    {
        let row = self.values.entry(state.clone()).or_default();
        let history_row = self.rewards.entry(state.clone()).or_default();
        for action in seed_actions {
            row.entry(action.clone()).or_insert(0.0);
            history_row.entry(action).or_default();
        }
    }

    /// Ensures a single `(state, action)` entry exists, creating the state
    /// row as well if needed.
    pub fn ensure_entry(&mut self, state: &GeneralizedState, action: &GeneralizedAction) {
        self.values
            .entry(state.clone())
            .or_default()
            .entry(action.clone())
            .or_insert(0.0);
        self.rewards
            .entry(state.clone())
            .or_default()
            .entry(action.clone())
            .or_default();
    }

    /// `true` when the state has a row (even an empty one).
    pub fn contains_state(&self, state: &GeneralizedState) -> bool {
        self.values.contains_key(state)
    }

    /// `true` when the `(state, action)` pair has an entry.
    pub fn contains_entry(&self, state: &GeneralizedState, action: &GeneralizedAction) -> bool {
        self.values
            .get(state)
            .map(|row| row.contains_key(action))
            .unwrap_or(false)
    }

    /// Returns the value of an entry, if present.
    pub fn value(&self, state: &GeneralizedState, action: &GeneralizedAction) -> Option<f64> {
        self.values.get(state).and_then(|row| row.get(action)).copied()
    }

    /// Returns the action → value row for a state, if present.
    pub fn actions(&self, state: &GeneralizedState) -> Option<&BTreeMap<GeneralizedAction, f64>> {
        self.values.get(state)
    }

    /// The greatest action value recorded at a state, or `None` when the
    /// state is unknown or has no actions.
    pub fn max_value(&self, state: &GeneralizedState) -> Option<f64> {
        self.values
            .get(state)
            .and_then(|row| row.values().copied().fold(None, |acc, v| match acc {
                None => Some(v),
                Some(m) => Some(m.max(v)),
            }))
    }

    /// Returns the reward history of an entry, if present.
    pub fn reward_history(
        &self,
        state: &GeneralizedState,
        action: &GeneralizedAction,
    ) -> Option<&[f64]> {
        self.rewards
            .get(state)
            .and_then(|row| row.get(action))
            .map(|h| h.as_slice())
    }

    /// Applies the temporal-difference rule to an existing entry and appends
    /// the reward to its history:
    /// `value += alpha * (reward + gamma * max_future - value)`.
    ///
    /// Returns `false` (and does nothing) when the entry does not exist; the
    /// fan-out update only ever touches existing abstraction levels.
    pub fn apply_td(
        &mut self,
        state: &GeneralizedState,
        action: &GeneralizedAction,
        reward: f64,
        max_future: f64,
        alpha: f64,
        gamma: f64,
    ) -> bool {
        let Some(value) = self.values.get_mut(state).and_then(|row| row.get_mut(action)) else {
            return false;
        };
        *value += alpha * (reward + gamma * max_future - *value);
        // value entry implies history entry
        if let Some(history) = self.rewards.get_mut(state).and_then(|row| row.get_mut(action)) {
            history.push(reward);
        }
        true
    }

    /// Iterates all known generalized states in ascending key order.
    pub fn states(&self) -> impl Iterator<Item = &GeneralizedState> {
        self.values.keys()
    }

    /// Total number of `(state, action)` entries; never decreases.
    pub fn entry_count(&self) -> usize {
        self.values.values().map(|row| row.len()).sum()
    }

    /// Number of known states; never decreases.
    pub fn state_count(&self) -> usize {
        self.values.len()
    }
}

/// Coefficient of variation of a sample: population standard deviation over
/// mean. Returns `None` for an empty sample or a zero mean.
pub fn coefficient_of_variation(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return None;
    }
    let variance = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Some(variance.sqrt() / mean)
}
