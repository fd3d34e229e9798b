//! Weighted Policy Learner, a policy-gradient baseline.
//!
//! WPL keeps an explicit stochastic policy next to a payoff table. After
//! each reward the payoff estimate is updated Q-style and the policy moves
//! along the payoff gradient, with each step weighted so that probabilities
//! approach the simplex boundary ever more slowly: a positive gradient is
//! scaled by `1 - p`, a negative one by `p`. Probabilities are floored and
//! renormalized after every move, so the policy never loses an action
//! entirely.
//!
//! Speaks the same phased protocol as the other learners; phases 3 and 4
//! are barrier no-ops.

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::protocol::{ActInput, FeedbackInput, Learner, Phase, PhaseTracker};
use crate::types::{ActionId, ParticipantId, StateId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Tuning knobs for [`Wpl`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WplConfig {
    /// Policy learning rate (eta).
    pub eta: f64,
    /// Payoff learning rate (alpha).
    pub alpha: f64,
    /// Payoff discount factor (gamma).
    pub gamma: f64,
    /// Lower bound kept on every action probability.
    pub floor: f64,
}

impl Default for WplConfig {
    fn default() -> Self {
        Self {
            eta: 0.002,
            alpha: 0.1,
            gamma: 0.999,
            floor: 0.0001,
        }
    }
}

impl WplConfig {
    /// Sets the policy learning rate.
    pub fn with_eta(mut self, eta: f64) -> Self {
        self.eta = eta;
        self
    }

    /// Sets the payoff learning rate.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the payoff discount factor.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Sets the probability floor.
    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor;
        self
    }
}

/// A Weighted Policy Learner over individual states and actions.
pub struct Wpl {
    name: ParticipantId,
    env: Rc<dyn Environment>,
    config: WplConfig,
    policy: BTreeMap<StateId, BTreeMap<ActionId, f64>>,
    payoff: BTreeMap<StateId, BTreeMap<ActionId, f64>>,
    tracker: PhaseTracker,
    starting_state: StateId,
    goal_state: StateId,
    state: StateId,
    action: Option<ActionId>,
    state_act: Option<StateId>,
    admissible: BTreeMap<ActionId, f64>,
    accumulated_reward: f64,
    terminated: bool,
}

impl Wpl {
    pub fn new(
        name: ParticipantId,
        env: Rc<dyn Environment>,
        starting_state: StateId,
        goal_state: StateId,
        config: WplConfig,
    ) -> Self {
        let mut learner = Self {
            name,
            env,
            config,
            policy: BTreeMap::new(),
            payoff: BTreeMap::new(),
            tracker: PhaseTracker::new(),
            state: starting_state.clone(),
            starting_state,
            goal_state,
            action: None,
            state_act: None,
            admissible: BTreeMap::new(),
            accumulated_reward: 0.0,
            terminated: false,
        };
        let start = learner.starting_state.clone();
        learner.ensure_rows(&start);
        learner
    }

    /// The current policy row for a state, if known.
    pub fn policy(&self, state: &StateId) -> Option<&BTreeMap<ActionId, f64>> {
        self.policy.get(state)
    }

    /// The current payoff estimate for a pair, if known.
    pub fn payoff(&self, state: &StateId, action: &ActionId) -> Option<f64> {
        self.payoff.get(state).and_then(|row| row.get(action)).copied()
    }

    /// Seeds an equiprobable policy row and a zero payoff row.
    fn ensure_rows(&mut self, state: &StateId) {
        if self.policy.contains_key(state) {
            return;
        }
        let actions = self.env.available_actions(state);
        let n = actions.len();
        let uniform = if n > 0 { 1.0 / n as f64 } else { 0.0 };
        let policy_row: BTreeMap<ActionId, f64> =
            actions.iter().map(|a| (a.clone(), uniform)).collect();
        let payoff_row: BTreeMap<ActionId, f64> =
            actions.into_iter().map(|a| (a, 0.0)).collect();
        self.policy.insert(state.clone(), policy_row);
        self.payoff.insert(state.clone(), payoff_row);
    }

    /// Samples an action proportionally to the admissible probabilities.
    fn sample(&self) -> Option<ActionId> {
        let total: f64 = self.admissible.values().sum();
        if total <= 0.0 {
            return self.admissible.keys().next().cloned();
        }
        let mut rng = rand::rng();
        let mut r = rng.random::<f64>() * total;
        let mut last = None;
        for (action, p) in &self.admissible {
            if r < *p {
                return Some(action.clone());
            }
            r -= p;
            last = Some(action.clone());
        }
        last
    }
}

impl Learner for Wpl {
    fn name(&self) -> &ParticipantId {
        &self.name
    }

    fn phase1(&mut self, input: &ActInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance(&self.name, Phase::Act1)?;
        let state_act = match &input.state {
            Some(state) => {
                self.ensure_rows(state);
                state.clone()
            }
            None => self.state.clone(),
        };
        self.state_act = Some(state_act);
        Ok(())
    }

    fn phase2(&mut self, input: &ActInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance(&self.name, Phase::Act2)?;

        let state_act = self.state_act.clone().ok_or_else(|| {
            Error::protocol(&self.name, Phase::Act2, "no state fixed in phase 1")
        })?;
        self.ensure_rows(&state_act);
        let row = self.policy.get(&state_act).cloned().unwrap_or_default();
        self.admissible = match &input.available_actions {
            None => row,
            Some(available) => row
                .into_iter()
                .filter(|(a, _)| available.contains(a))
                .collect(),
        };

        if self.admissible.is_empty() {
            log::debug!("{} has no admissible action in {}", self.name, state_act);
            self.terminated = true;
            return Ok(());
        }

        self.action = self.sample();
        if self.action.is_none() {
            return Err(Error::Internal(
                "sampling returned nothing for a non-empty policy".into(),
            ));
        }
        Ok(())
    }

    fn phase3(&mut self, _input: &ActInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance(&self.name, Phase::Act3)
    }

    fn phase4(&mut self, _input: &ActInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance(&self.name, Phase::Act4)
    }

    fn finalize_action(&mut self, _input: &ActInput) -> Result<(StateId, ActionId)> {
        if self.terminated {
            return Err(Error::protocol(
                &self.name,
                Phase::FinalizeAction,
                "terminated participant asked to act",
            ));
        }
        self.tracker.advance(&self.name, Phase::FinalizeAction)?;
        let state = self.state_act.clone().ok_or_else(|| {
            Error::Internal(format!("{} finalized without an acting state", self.name))
        })?;
        let action = self.action.clone().ok_or_else(|| {
            Error::Internal(format!("{} finalized without an action", self.name))
        })?;
        Ok((state, action))
    }

    fn feedback_phase1(&mut self, _feedback: &FeedbackInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance_feedback(&self.name, Phase::Feedback1)?;
        Ok(())
    }

    fn feedback_phase2(&mut self, _feedback: &FeedbackInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance_feedback(&self.name, Phase::Feedback2)?;
        Ok(())
    }

    fn feedback_phase3(&mut self, _feedback: &FeedbackInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance_feedback(&self.name, Phase::Feedback3)?;
        Ok(())
    }

    fn finalize_feedback(&mut self, feedback: &FeedbackInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        if !self
            .tracker
            .advance_feedback(&self.name, Phase::FinalizeFeedback)?
        {
            return Ok(());
        }

        let new_state = feedback.new_state.clone();
        let (f_state, f_action) = match &feedback.previous {
            Some((state, action)) => (state.clone(), Some(action.clone())),
            None => (self.state.clone(), self.action.clone()),
        };
        self.ensure_rows(&f_state);
        self.ensure_rows(&new_state);

        if let Some(action) = f_action {
            let max_future = self
                .payoff
                .get(&new_state)
                .map(|row| row.values().copied().fold(0.0f64, f64::max))
                .unwrap_or(0.0);
            if let Some(value) = self
                .payoff
                .get_mut(&f_state)
                .and_then(|row| row.get_mut(&action))
            {
                *value += self.config.alpha
                    * (feedback.reward + self.config.gamma * max_future - *value);
            }

            // gradient step over the whole row, weighted toward the interior
            let payoff_row = self.payoff.get(&f_state).cloned().unwrap_or_default();
            if !payoff_row.is_empty() {
                let average: f64 =
                    payoff_row.values().sum::<f64>() / payoff_row.len() as f64;
                if let Some(policy_row) = self.policy.get_mut(&f_state) {
                    for (a, p) in policy_row.iter_mut() {
                        let mut delta =
                            payoff_row.get(a).copied().unwrap_or(0.0) - average;
                        delta *= if delta > 0.0 { 1.0 - *p } else { *p };
                        *p = (*p + self.config.eta * delta).max(self.config.floor);
                    }
                    let total: f64 = policy_row.values().sum();
                    if total > 0.0 {
                        for p in policy_row.values_mut() {
                            *p /= total;
                        }
                    }
                }
            }
        }

        self.state = new_state.clone();
        self.accumulated_reward += feedback.reward;

        let no_actions = self
            .policy
            .get(&new_state)
            .map(|row| row.is_empty())
            .unwrap_or(true);
        if new_state == self.goal_state || no_actions {
            log::debug!("{} terminated in {}", self.name, new_state);
            self.terminated = true;
        }
        Ok(())
    }

    fn has_terminated(&self) -> bool {
        self.terminated
    }

    fn current_state(&self) -> &StateId {
        &self.state
    }

    fn accumulated_reward(&self) -> f64 {
        self.accumulated_reward
    }

    fn reset_episode(&mut self) {
        self.state = self.starting_state.clone();
        self.action = None;
        self.state_act = None;
        self.admissible.clear();
        self.accumulated_reward = 0.0;
        self.terminated = false;
        self.tracker.reset();
    }

    fn reset_all(&mut self) {
        self.policy.clear();
        self.payoff.clear();
        let start = self.starting_state.clone();
        self.ensure_rows(&start);
        self.reset_episode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoArm;

    impl Environment for TwoArm {
        fn available_actions(&self, state: &StateId) -> Vec<ActionId> {
            if state == &StateId::new("goal") {
                Vec::new()
            } else {
                vec![ActionId::new("a"), ActionId::new("b")]
            }
        }
    }

    fn learner() -> Wpl {
        Wpl::new(
            ParticipantId::new("w"),
            Rc::new(TwoArm),
            StateId::new("s0"),
            StateId::new("goal"),
            WplConfig::default().with_eta(0.1),
        )
    }

    fn step(l: &mut Wpl, reward: f64, new_state: &str) -> ActionId {
        let input = ActInput::current();
        l.phase1(&input).unwrap();
        l.phase2(&input).unwrap();
        l.phase3(&input).unwrap();
        l.phase4(&input).unwrap();
        let (_, action) = l.finalize_action(&input).unwrap();
        let feedback = FeedbackInput::new(reward, StateId::new(new_state));
        l.feedback_phase1(&feedback).unwrap();
        l.feedback_phase2(&feedback).unwrap();
        l.feedback_phase3(&feedback).unwrap();
        l.finalize_feedback(&feedback).unwrap();
        action
    }

    #[test]
    fn test_policy_starts_equiprobable() {
        let l = learner();
        let row = l.policy(&StateId::new("s0")).unwrap();
        assert_eq!(row.len(), 2);
        for p in row.values() {
            assert!((p - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rewarded_action_gains_probability() {
        let mut l = learner();
        for _ in 0..50 {
            step(&mut l, 10.0, "s0");
        }
        // every action was rewarded whenever picked, so payoffs are positive
        // and the row still sums to one; renormalization runs after the
        // floor, so only positivity is guaranteed
        let row = l.policy(&StateId::new("s0")).unwrap();
        let total: f64 = row.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        for p in row.values() {
            assert!(*p > 0.0);
        }
    }

    #[test]
    fn test_probabilities_never_collapse() {
        let mut l = learner();
        // punish whatever is chosen, hard and often
        for _ in 0..200 {
            step(&mut l, -50.0, "s0");
        }
        let row = l.policy(&StateId::new("s0")).unwrap();
        for p in row.values() {
            assert!(*p > 0.0);
        }
        let total: f64 = row.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_goal_terminates() {
        let mut l = learner();
        step(&mut l, 100.0, "goal");
        assert!(l.has_terminated());
        assert_eq!(l.accumulated_reward(), 100.0);
    }
}
