//! Independent tabular Q-learning over individual states and actions.
//!
//! The baseline learner: it speaks the same phased protocol as the
//! negotiating learners so that mixed populations can share one driver, but
//! it never communicates. Phases 3 and 4 are barrier no-ops.

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::exploration::ExplorationStrategy;
use crate::protocol::{ActInput, FeedbackInput, Learner, Phase, PhaseTracker};
use crate::types::{ActionId, ParticipantId, StateId};
use std::collections::BTreeMap;
use std::rc::Rc;

/// A plain tabular Q-learner.
pub struct QLearner {
    name: ParticipantId,
    env: Rc<dyn Environment>,
    exploration: Box<dyn ExplorationStrategy<ActionId>>,
    alpha: f64,
    gamma: f64,
    table: BTreeMap<StateId, BTreeMap<ActionId, f64>>,
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

impl QLearner {
    pub fn new(
        name: ParticipantId,
        env: Rc<dyn Environment>,
        starting_state: StateId,
        goal_state: StateId,
        alpha: f64,
        gamma: f64,
        exploration: Box<dyn ExplorationStrategy<ActionId>>,
    ) -> Self {
        let mut learner = Self {
            name,
            env,
            exploration,
            alpha,
            gamma,
            table: BTreeMap::new(),
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
        learner.ensure_row(&start);
        learner
    }

    /// The learned value of an action, if the pair is known.
    pub fn value(&self, state: &StateId, action: &ActionId) -> Option<f64> {
        self.table.get(state).and_then(|row| row.get(action)).copied()
    }

    fn ensure_row(&mut self, state: &StateId) {
        if self.table.contains_key(state) {
            return;
        }
        let row: BTreeMap<ActionId, f64> = self
            .env
            .available_actions(state)
            .into_iter()
            .map(|a| (a, 0.0))
            .collect();
        self.table.insert(state.clone(), row);
    }
}

impl Learner for QLearner {
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
                self.ensure_row(state);
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
        self.ensure_row(&state_act);
        let row = self.table.get(&state_act).cloned().unwrap_or_default();
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

        self.action = self.exploration.choose(&self.admissible);
        if self.action.is_none() {
            return Err(Error::Internal(
                "exploration returned nothing for a non-empty mapping".into(),
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
            // feedback before any action this timestep carries nothing to
            // credit
            return Ok(());
        }

        let new_state = feedback.new_state.clone();
        let (f_state, f_action) = match &feedback.previous {
            Some((state, action)) => (state.clone(), Some(action.clone())),
            None => (self.state.clone(), self.action.clone()),
        };
        self.ensure_row(&f_state);
        self.ensure_row(&new_state);

        if let Some(action) = f_action {
            let max_future = self
                .table
                .get(&new_state)
                .and_then(|row| row.values().copied().fold(None, |m: Option<f64>, v| {
                    Some(m.map_or(v, |m| m.max(v)))
                }))
                .unwrap_or(0.0);
            if let Some(value) = self
                .table
                .get_mut(&f_state)
                .and_then(|row| row.get_mut(&action))
            {
                *value += self.alpha * (feedback.reward + self.gamma * max_future - *value);
            }
        }

        self.state = new_state.clone();
        self.accumulated_reward += feedback.reward;

        let no_actions = self
            .table
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
        self.exploration.reset_episode();
    }

    fn reset_all(&mut self) {
        self.table.clear();
        let start = self.starting_state.clone();
        self.ensure_row(&start);
        self.exploration.reset_all();
        self.reset_episode();
    }
}
