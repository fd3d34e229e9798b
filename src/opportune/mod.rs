//! The OPPORTUNE learner: opportunistic joint-action negotiation over a
//! lazily-grown generalized value table.
//!
//! Each timestep a learner fixes the individual state it reasons about
//! (phase 1), picks the most informative known generalized state and samples
//! a candidate action from the individual state's row, proposing it to the
//! named neighbors when it is joint (phase 2), answers received proposals
//! (phase 3), and resolves its own proposal or acceptance (phase 4). The
//! finalize step always yields an individual action; a finalized joint
//! action is distributed through typed adoption messages so that every
//! involved learner acts on the same joint key.
//!
//! On feedback the learner may grow the acted key by one neighbor component
//! (state growth when the reward history is volatile, action growth
//! otherwise), then fans the temporal-difference update out over every
//! existing subset projection of the acted pair that contains itself.

pub(crate) mod generalization;
pub(crate) mod negotiation;

use crate::comm::{Adoption, Bid, CommLayer};
use crate::config::LearningParams;
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::exploration::ExplorationStrategy;
use crate::joint::{GeneralizedAction, GeneralizedState};
use crate::protocol::{ActInput, FeedbackInput, Learner, Phase, PhaseTracker};
use crate::table::{coefficient_of_variation, ValueTable};
use crate::types::{ActionId, ParticipantId, StateId};
use negotiation::NegotiationState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// Tuning knobs for an OPPORTUNE learner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpportuneConfig {
    /// Temporal-difference parameters.
    pub params: LearningParams,
    /// Reward-history coefficient-of-variation threshold above which the
    /// state key is grown instead of the action key.
    pub cov_threshold: f64,
    /// Whether a feedback round arriving before any action in the current
    /// timestep is processed (against an explicit previous pair) or ignored.
    pub process_initial_feedback: bool,
}

impl Default for OpportuneConfig {
    fn default() -> Self {
        Self {
            params: LearningParams::default(),
            cov_threshold: 0.001,
            process_initial_feedback: false,
        }
    }
}

impl OpportuneConfig {
    pub fn new(params: LearningParams, cov_threshold: f64) -> Self {
        Self {
            params,
            cov_threshold,
            process_initial_feedback: false,
        }
    }

    /// Sets the learning parameters.
    pub fn with_params(mut self, params: LearningParams) -> Self {
        self.params = params;
        self
    }

    /// Sets the growth threshold.
    pub fn with_cov_threshold(mut self, threshold: f64) -> Self {
        self.cov_threshold = threshold;
        self
    }

    /// Enables or disables processing of pre-action feedback rounds.
    pub fn with_process_initial_feedback(mut self, process: bool) -> Self {
        self.process_initial_feedback = process;
        self
    }
}

/// The acted transition a feedback round is credited to, fixed in feedback
/// phase 1 and consumed by the final feedback phase.
#[derive(Debug)]
struct FeedbackScratch {
    /// The generalized pair the learner acted on, absent for a processed
    /// pre-action round.
    pair: Option<(GeneralizedState, GeneralizedAction)>,
    new_state: StateId,
}

/// A decentralized learner negotiating joint actions with its neighbors.
pub struct OpportuneLearner {
    name: ParticipantId,
    env: Rc<dyn Environment>,
    comm: Rc<CommLayer>,
    exploration: Box<dyn ExplorationStrategy<GeneralizedAction>>,
    config: OpportuneConfig,
    /// Sorted, deduplicated, never contains `name`.
    neighbors: Vec<ParticipantId>,
    table: ValueTable,
    tracker: PhaseTracker,
    starting_state: StateId,
    goal_state: StateId,
    state: StateId,
    gstate: GeneralizedState,
    chosen: Option<GeneralizedAction>,
    action: Option<ActionId>,
    state_act: Option<StateId>,
    admissible: BTreeMap<GeneralizedAction, f64>,
    negotiation: NegotiationState,
    /// Acted pairs awaiting feedback, oldest first.
    pending: VecDeque<(GeneralizedState, GeneralizedAction)>,
    feedback: Option<FeedbackScratch>,
    accumulated_reward: f64,
    terminated: bool,
}

impl OpportuneLearner {
    /// Creates a learner and registers it with the communication layer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: ParticipantId,
        env: Rc<dyn Environment>,
        starting_state: StateId,
        goal_state: StateId,
        neighbors: Vec<ParticipantId>,
        config: OpportuneConfig,
        exploration: Box<dyn ExplorationStrategy<GeneralizedAction>>,
        comm: Rc<CommLayer>,
    ) -> Result<Self> {
        if neighbors.contains(&name) {
            return Err(Error::Config(format!(
                "participant {} cannot be its own neighbor",
                name
            )));
        }
        let mut neighbors = neighbors;
        neighbors.sort();
        neighbors.dedup();

        comm.register(&name)?;
        comm.publish_state(&name, starting_state.clone());

        let gstate = GeneralizedState::single(name.clone(), starting_state.clone());
        let mut learner = Self {
            name,
            env,
            comm,
            exploration,
            config,
            neighbors,
            table: ValueTable::new(),
            tracker: PhaseTracker::new(),
            state: starting_state.clone(),
            gstate,
            starting_state,
            goal_state,
            chosen: None,
            action: None,
            state_act: None,
            admissible: BTreeMap::new(),
            negotiation: NegotiationState::default(),
            pending: VecDeque::new(),
            feedback: None,
            accumulated_reward: 0.0,
            terminated: false,
        };
        let start = learner.starting_state.clone();
        learner.ensure_individual_state(&start);
        Ok(learner)
    }

    /// The learned value table.
    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    /// Mutable access to the value table, for seeding and inspection.
    pub fn table_mut(&mut self) -> &mut ValueTable {
        &mut self.table
    }

    /// The generalized state the learner currently reasons from.
    pub fn generalized_state(&self) -> &GeneralizedState {
        &self.gstate
    }

    /// The declared neighbor set, sorted.
    pub fn neighbors(&self) -> &[ParticipantId] {
        &self.neighbors
    }

    fn ensure_individual_state(&mut self, state: &StateId) {
        let key = GeneralizedState::single(self.name.clone(), state.clone());
        self.ensure_generalized_state(&key);
    }

    /// Creates the row for a generalized state, seeding it with this
    /// learner's individual actions for its own state component.
    fn ensure_generalized_state(&mut self, state: &GeneralizedState) {
        if self.table.contains_state(state) {
            return;
        }
        let seeds: Vec<GeneralizedAction> = match state.get(&self.name) {
            Some(own) => self
                .env
                .available_actions(own)
                .into_iter()
                .map(|a| GeneralizedAction::single(self.name.clone(), a))
                .collect(),
            None => Vec::new(),
        };
        self.table.ensure_state(state, seeds);
    }

    /// Re-chooses among the individual-only admissible actions after a
    /// failed negotiation.
    fn fall_back_to_individual(&mut self) -> Result<()> {
        let singles: BTreeMap<GeneralizedAction, f64> = self
            .admissible
            .iter()
            .filter(|(a, _)| !a.is_joint())
            .map(|(a, v)| (a.clone(), *v))
            .collect();
        let chosen = self.exploration.choose(&singles).ok_or_else(|| {
            Error::Internal(format!("{} has no individual fallback action", self.name))
        })?;
        let own = chosen.get(&self.name).cloned().ok_or_else(|| {
            Error::Internal(format!(
                "fallback action {} lacks a component for {}",
                chosen, self.name
            ))
        })?;
        log::debug!("{} falls back to individual action {}", self.name, own);
        self.chosen = Some(chosen);
        self.action = Some(own);
        Ok(())
    }

    /// Applies the growth rules to the acted pair and ensures the resulting
    /// key exists. At most one component is merged per feedback round, and
    /// keys never outgrow the neighbor set plus self.
    fn grow_key(
        &mut self,
        f_s: GeneralizedState,
        f_a: GeneralizedAction,
    ) -> (GeneralizedState, GeneralizedAction) {
        let cap = self.neighbors.len() + 1;
        let volatile = {
            let history = self.table.reward_history(&f_s, &f_a).unwrap_or(&[]);
            !history.is_empty()
                && history.iter().sum::<f64>() > 0.0
                && coefficient_of_variation(history)
                    .map_or(false, |cv| cv > self.config.cov_threshold)
        };

        let (mut f_s, mut f_a) = (f_s, f_a);
        if volatile {
            if f_s.len() < cap {
                for n in &self.neighbors {
                    if f_s.contains(n) {
                        continue;
                    }
                    let Some(snapshot) = self.comm.snapshot(n) else {
                        continue;
                    };
                    let Some(state) = snapshot.feedback_state else {
                        continue;
                    };
                    log::debug!("{} grows its state key with {}", self.name, n);
                    f_s = f_s.with(n.clone(), state);
                    break;
                }
            }
        } else if f_a.len() < cap {
            for n in &self.neighbors {
                if f_a.contains(n) {
                    continue;
                }
                let Some(snapshot) = self.comm.snapshot(n) else {
                    continue;
                };
                let Some(action) = snapshot.feedback_action else {
                    continue;
                };
                log::debug!("{} grows its action key with {}", self.name, n);
                f_a = f_a.with(n.clone(), action);
                break;
            }
        }

        self.ensure_generalized_state(&f_s);
        self.table.ensure_entry(&f_s, &f_a);
        (f_s, f_a)
    }
}

impl Learner for OpportuneLearner {
    fn name(&self) -> &ParticipantId {
        &self.name
    }

    fn phase1(&mut self, input: &ActInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance(&self.name, Phase::Act1)?;
        self.comm.begin_step(&self.name);

        let state_act = match &input.state {
            Some(state) => {
                self.ensure_individual_state(state);
                state.clone()
            }
            None => self.state.clone(),
        };
        self.comm.publish_state(&self.name, self.state.clone());
        self.state_act = Some(state_act);
        Ok(())
    }

    fn phase2(&mut self, input: &ActInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance(&self.name, Phase::Act2)?;

        if self.gstate.is_joint() {
            // refresh the joint perception from published snapshots, then
            // drop to the most valuable known substate
            let mut refreshed = self.gstate.clone();
            for p in self.gstate.participants() {
                if let Some(snapshot) = self.comm.snapshot(p) {
                    if let Some(state) = snapshot.state {
                        refreshed = refreshed.with(p.clone(), state);
                    }
                }
            }
            self.gstate =
                match generalization::best_substate(&self.table, &refreshed, &self.name) {
                    Some(substate) => substate,
                    None => GeneralizedState::single(
                        self.name.clone(),
                        refreshed
                            .get(&self.name)
                            .cloned()
                            .unwrap_or_else(|| self.state.clone()),
                    ),
                };
        }

        self.negotiation.clear();
        self.admissible.clear();

        let state_act = self.state_act.clone().ok_or_else(|| {
            Error::protocol(&self.name, Phase::Act2, "no state fixed in phase 1")
        })?;
        self.ensure_individual_state(&state_act);
        let own_key = GeneralizedState::single(self.name.clone(), state_act.clone());
        let row = self.table.actions(&own_key).cloned().unwrap_or_default();
        self.admissible = match &input.available_actions {
            None => row,
            Some(available) => row
                .into_iter()
                .filter(|(a, _)| {
                    a.get(&self.name)
                        .map(|c| available.contains(c))
                        .unwrap_or(false)
                })
                .collect(),
        };

        if self.admissible.is_empty() {
            log::debug!("{} has no admissible action in {}", self.name, state_act);
            self.terminated = true;
            return Ok(());
        }

        let chosen = self.exploration.choose(&self.admissible).ok_or_else(|| {
            Error::Internal("exploration returned nothing for a non-empty mapping".into())
        })?;
        let own = chosen.get(&self.name).cloned().ok_or_else(|| {
            Error::Internal(format!(
                "admissible action {} lacks a component for {}",
                chosen, self.name
            ))
        })?;

        if chosen.is_joint() {
            let estimate = self.admissible.get(&chosen).copied().unwrap_or(0.0);
            log::debug!(
                "{} proposes joint action {} at value {:.4}",
                self.name,
                chosen,
                estimate
            );
            self.negotiation.proposed = Some(chosen.clone());
            for p in chosen.participants().filter(|p| **p != self.name) {
                if let Some(component) = chosen.get(p) {
                    self.comm.push_bid(
                        p,
                        Bid {
                            proposer: self.name.clone(),
                            action: component.clone(),
                            value: estimate,
                        },
                    );
                }
            }
        }

        self.chosen = Some(chosen);
        self.action = Some(own);
        Ok(())
    }

    fn phase3(&mut self, _input: &ActInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance(&self.name, Phase::Act3)?;

        let mut bids = self.comm.take_bids(&self.name);
        if bids.is_empty() {
            return Ok(());
        }

        let own_estimate = self
            .chosen
            .as_ref()
            .and_then(|a| self.admissible.get(a))
            .copied()
            .unwrap_or(f64::NEG_INFINITY);
        let accepted = negotiation::select_acceptable_bid(&mut bids, own_estimate);

        for (i, bid) in bids.iter().enumerate() {
            let reply = if Some(i) == accepted {
                crate::comm::Reply::Accept
            } else {
                crate::comm::Reply::Reject
            };
            self.comm.push_reply(&bid.proposer, &self.name, reply);
        }

        if let Some(i) = accepted {
            log::debug!("{} accepts the bid from {}", self.name, bids[i].proposer);
            self.comm.set_accepted_elsewhere(&self.name, true);
            self.negotiation.accepted = Some(bids.swap_remove(i));
        }
        Ok(())
    }

    fn phase4(&mut self, _input: &ActInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.tracker.advance(&self.name, Phase::Act4)?;

        if self.negotiation.accepted.is_some() {
            // accepting a bid abandons this learner's own proposal
            if self.negotiation.proposed.take().is_some() {
                self.fall_back_to_individual()?;
            }
            let abandoned = self
                .negotiation
                .accepted
                .as_ref()
                .map(|bid| {
                    self.comm
                        .snapshot(&bid.proposer)
                        .map(|s| s.accepted_elsewhere)
                        .unwrap_or(false)
                })
                .unwrap_or(false);
            if abandoned {
                // the bidder walked away from its own proposal
                log::debug!("{} saw its accepted bidder defect", self.name);
                self.negotiation.accepted = None;
            }
        } else if let Some(proposed) = self.negotiation.proposed.clone() {
            if self.chosen.as_ref() != Some(&proposed) {
                return Err(Error::protocol(
                    &self.name,
                    Phase::Act4,
                    "proposed joint action diverged from the chosen action",
                ));
            }
            let replies = self.comm.replies(&self.name);
            let rejected = negotiation::rejection_count(&proposed, &self.name, &replies);
            if rejected > 0 {
                log::debug!(
                    "{} negotiation failed with {} rejections",
                    self.name,
                    rejected
                );
                self.negotiation.proposed = None;
                self.fall_back_to_individual()?;
            } else {
                log::debug!("{} negotiation succeeded for {}", self.name, proposed);
                for p in proposed.participants().filter(|p| **p != self.name) {
                    self.comm.push_adoption(
                        p,
                        Adoption {
                            action: proposed.clone(),
                            state: self.gstate.clone(),
                        },
                    );
                }
            }
        }
        Ok(())
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

        if let Some(adoption) = self.comm.take_adoption(&self.name) {
            let Some(accepted) = self.negotiation.accepted.take() else {
                return Err(Error::protocol(
                    &self.name,
                    Phase::FinalizeAction,
                    "received an adoption for a bid that was never accepted",
                ));
            };
            let own = adoption.action.get(&self.name).cloned().ok_or_else(|| {
                Error::Internal(format!(
                    "adopted action {} lacks a component for {}",
                    adoption.action, self.name
                ))
            })?;
            if own != accepted.action {
                return Err(Error::protocol(
                    &self.name,
                    Phase::FinalizeAction,
                    "adopted action differs from the accepted bid",
                ));
            }
            log::debug!("{} adopts joint action {}", self.name, adoption.action);
            self.chosen = Some(adoption.action);
            self.action = Some(own);
            self.gstate = adoption.state;
        } else if self.negotiation.accepted.take().is_some() {
            // the accepted bidder never finalized its proposal
            self.fall_back_to_individual()?;
        }

        let chosen = self.chosen.clone().ok_or_else(|| {
            Error::Internal(format!("{} finalized without a chosen action", self.name))
        })?;
        let action = self.action.clone().ok_or_else(|| {
            Error::Internal(format!("{} finalized without an action", self.name))
        })?;
        let state = self.state_act.clone().ok_or_else(|| {
            Error::Internal(format!("{} finalized without an acting state", self.name))
        })?;

        self.pending.push_back((self.gstate.clone(), chosen));
        self.comm.publish_action(&self.name, action.clone());
        Ok((state, action))
    }

    fn feedback_phase1(&mut self, feedback: &FeedbackInput) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        let acted_round = self.tracker.advance_feedback(&self.name, Phase::Feedback1)?;
        if !acted_round {
            // a pre-action round is processed only when configured, and then
            // only against an explicit previous pair
            let pairless = self.pending.is_empty() && feedback.previous.is_none();
            if !self.config.process_initial_feedback || pairless {
                log::debug!("{} ignores a pre-action feedback round", self.name);
                self.feedback = None;
                return Ok(());
            }
        }

        let new_state = feedback.new_state.clone();
        self.ensure_individual_state(&new_state);

        let (f_state, f_action) = match &feedback.previous {
            Some((state, action)) => (state.clone(), Some(action.clone())),
            None => (self.state.clone(), self.action.clone()),
        };
        self.ensure_individual_state(&f_state);

        // the generalized pair the reward belongs to, oldest pending first;
        // an explicit previous pair stands in when nothing is pending
        let pair = self.pending.pop_front().or_else(|| {
            feedback.previous.as_ref().map(|(state, action)| {
                (
                    GeneralizedState::single(self.name.clone(), state.clone()),
                    GeneralizedAction::single(self.name.clone(), action.clone()),
                )
            })
        });
        if let Some((s, a)) = &pair {
            let s = s.clone();
            let a = a.clone();
            self.ensure_generalized_state(&s);
            self.table.ensure_entry(&s, &a);
        }

        self.comm
            .publish_feedback(&self.name, f_state, f_action, new_state.clone());
        self.feedback = Some(FeedbackScratch { pair, new_state });
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
        self.tracker
            .advance_feedback(&self.name, Phase::FinalizeFeedback)?;
        let Some(scratch) = self.feedback.take() else {
            return Ok(());
        };
        let reward = feedback.reward;
        let new_state = scratch.new_state;

        let acted = scratch.pair.map(|(s, a)| self.grow_key(s, a));

        // the most valuable known generalized state describing the new
        // individual state, refreshed with every member's new component
        let base = generalization::best_state_for(&self.table, &self.name, &new_state)
            .or_else(|| acted.as_ref().map(|(s, _)| s.clone()))
            .unwrap_or_else(|| {
                GeneralizedState::single(self.name.clone(), new_state.clone())
            });
        let mut new_gstate = base;
        for p in new_gstate.participants().cloned().collect::<Vec<_>>() {
            if let Some(snapshot) = self.comm.snapshot(&p) {
                if let Some(component) = snapshot.feedback_new_state {
                    new_gstate = new_gstate.with(p, component);
                }
            }
        }
        self.ensure_generalized_state(&new_gstate);
        let max_future = self.table.max_value(&new_gstate).unwrap_or(0.0);

        if let Some((f_s, f_a)) = &acted {
            let state_participants: Vec<ParticipantId> =
                f_s.participants().cloned().collect();
            let action_participants: Vec<ParticipantId> =
                f_a.participants().cloned().collect();
            let action_subsets: Vec<GeneralizedAction> =
                generalization::subsets_containing(&action_participants, &self.name, false)
                    .into_iter()
                    .filter_map(|subset| f_a.project(subset.iter()))
                    .collect();

            let mut updated = 0usize;
            for subset in
                generalization::subsets_containing(&state_participants, &self.name, false)
            {
                let Some(state) = f_s.project(subset.iter()) else {
                    continue;
                };
                if !self.table.contains_state(&state) {
                    continue;
                }
                for action in &action_subsets {
                    if self.table.apply_td(
                        &state,
                        action,
                        reward,
                        max_future,
                        self.config.params.alpha,
                        self.config.params.gamma,
                    ) {
                        updated += 1;
                    }
                }
            }
            log::debug!(
                "{} credited reward {:.2} to {} entries",
                self.name,
                reward,
                updated
            );
        }

        self.state = new_state.clone();
        self.gstate = new_gstate.clone();
        self.comm.publish_state(&self.name, new_state.clone());
        self.accumulated_reward += reward;

        let no_actions = self
            .table
            .actions(&new_gstate)
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
        self.gstate = GeneralizedState::single(self.name.clone(), self.starting_state.clone());
        self.chosen = None;
        self.action = None;
        self.state_act = None;
        self.admissible.clear();
        self.negotiation.clear();
        self.pending.clear();
        self.feedback = None;
        self.accumulated_reward = 0.0;
        self.terminated = false;
        self.tracker.reset();
        self.exploration.reset_episode();
        self.comm.begin_step(&self.name);
        self.comm.publish_state(&self.name, self.starting_state.clone());
    }

    fn reset_all(&mut self) {
        self.table = ValueTable::new();
        let start = self.starting_state.clone();
        self.ensure_individual_state(&start);
        self.exploration.reset_all();
        self.reset_episode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two-cell corridor: `s0` offers `go`/`stay`, `s1` is terminal.
    struct Corridor;

    impl Environment for Corridor {
        fn available_actions(&self, state: &StateId) -> Vec<ActionId> {
            if state == &StateId::new("s0") {
                vec![ActionId::new("go"), ActionId::new("stay")]
            } else {
                Vec::new()
            }
        }
    }

    /// Always picks the first option, so tests are deterministic.
    struct FirstOption;

    impl ExplorationStrategy<GeneralizedAction> for FirstOption {
        fn choose(
            &mut self,
            options: &BTreeMap<GeneralizedAction, f64>,
        ) -> Option<GeneralizedAction> {
            options.keys().next().cloned()
        }
    }

    fn learner_with_config(
        name: &str,
        comm: &Rc<CommLayer>,
        config: OpportuneConfig,
    ) -> OpportuneLearner {
        OpportuneLearner::new(
            ParticipantId::new(name),
            Rc::new(Corridor),
            StateId::new("s0"),
            StateId::new("s1"),
            Vec::new(),
            config,
            Box::new(FirstOption),
            comm.clone(),
        )
        .unwrap()
    }

    fn learner(name: &str, comm: &Rc<CommLayer>) -> OpportuneLearner {
        learner_with_config(name, comm, OpportuneConfig::default())
    }

    #[test]
    fn test_full_cycle_updates_table_and_terminates() {
        let comm = CommLayer::new();
        let mut l = learner("x", &comm);
        let input = ActInput::current();

        l.phase1(&input).unwrap();
        l.phase2(&input).unwrap();
        l.phase3(&input).unwrap();
        l.phase4(&input).unwrap();
        let (state, action) = l.finalize_action(&input).unwrap();
        assert_eq!(state, StateId::new("s0"));
        assert_eq!(action, ActionId::new("go"));

        let feedback = FeedbackInput::new(5.0, StateId::new("s1"));
        l.feedback_phase1(&feedback).unwrap();
        l.feedback_phase2(&feedback).unwrap();
        l.feedback_phase3(&feedback).unwrap();
        l.finalize_feedback(&feedback).unwrap();

        let s0 = GeneralizedState::single(ParticipantId::new("x"), StateId::new("s0"));
        let go = GeneralizedAction::single(ParticipantId::new("x"), ActionId::new("go"));
        // alpha 0.3, terminal future value 0
        let value = l.table().value(&s0, &go).unwrap();
        assert!((value - 1.5).abs() < 1e-12);
        assert_eq!(l.accumulated_reward(), 5.0);
        assert!(l.has_terminated());
        assert_eq!(l.current_state(), &StateId::new("s1"));
    }

    #[test]
    fn test_out_of_order_phase_is_a_violation() {
        let comm = CommLayer::new();
        let mut l = learner("x", &comm);
        let err = l.phase2(&ActInput::current()).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_empty_available_subset_marks_terminal() {
        let comm = CommLayer::new();
        let mut l = learner("x", &comm);
        let input = ActInput::current().with_available(vec![ActionId::new("fly")]);
        l.phase1(&input).unwrap();
        l.phase2(&input).unwrap();
        assert!(l.has_terminated());
        assert!(l.finalize_action(&ActInput::current()).is_err());
    }

    #[test]
    fn test_pre_action_feedback_is_ignored_by_default() {
        let comm = CommLayer::new();
        let mut l = learner("x", &comm);
        let feedback = FeedbackInput::new(0.0, StateId::new("s0"));
        l.feedback_phase1(&feedback).unwrap();
        l.finalize_feedback(&feedback).unwrap();
        assert_eq!(l.accumulated_reward(), 0.0);
        // the act cycle is still intact afterwards
        l.phase1(&ActInput::current()).unwrap();
        l.phase2(&ActInput::current()).unwrap();
    }

    #[test]
    fn test_pre_action_feedback_without_pair_is_dropped_even_when_enabled() {
        let comm = CommLayer::new();
        let config = OpportuneConfig::default().with_process_initial_feedback(true);
        let mut l = learner_with_config("x", &comm, config);

        // no acted pair and no explicit previous pair: nothing to credit
        let feedback = FeedbackInput::new(7.0, StateId::new("s1"));
        l.feedback_phase1(&feedback).unwrap();
        l.feedback_phase2(&feedback).unwrap();
        l.feedback_phase3(&feedback).unwrap();
        l.finalize_feedback(&feedback).unwrap();

        assert_eq!(l.accumulated_reward(), 0.0);
        assert_eq!(l.current_state(), &StateId::new("s0"));
        assert!(!l.has_terminated());
    }

    #[test]
    fn test_pre_action_feedback_with_explicit_pair_is_processed() {
        let comm = CommLayer::new();
        let config = OpportuneConfig::default().with_process_initial_feedback(true);
        let mut l = learner_with_config("x", &comm, config);

        let feedback = FeedbackInput::new(7.0, StateId::new("s1"))
            .with_previous(StateId::new("s0"), ActionId::new("go"));
        l.feedback_phase1(&feedback).unwrap();
        l.feedback_phase2(&feedback).unwrap();
        l.feedback_phase3(&feedback).unwrap();
        l.finalize_feedback(&feedback).unwrap();

        let s0 = GeneralizedState::single(ParticipantId::new("x"), StateId::new("s0"));
        let go = GeneralizedAction::single(ParticipantId::new("x"), ActionId::new("go"));
        // alpha 0.3 against a terminal successor
        let value = l.table().value(&s0, &go).unwrap();
        assert!((value - 2.1).abs() < 1e-12);
        assert_eq!(l.accumulated_reward(), 7.0);
        assert_eq!(l.current_state(), &StateId::new("s1"));
        assert!(l.has_terminated());
    }

    #[test]
    fn test_reset_episode_restores_start_without_forgetting() {
        let comm = CommLayer::new();
        let mut l = learner("x", &comm);
        let input = ActInput::current();
        l.phase1(&input).unwrap();
        l.phase2(&input).unwrap();
        l.phase3(&input).unwrap();
        l.phase4(&input).unwrap();
        l.finalize_action(&input).unwrap();
        let feedback = FeedbackInput::new(5.0, StateId::new("s1"));
        l.feedback_phase1(&feedback).unwrap();
        l.feedback_phase2(&feedback).unwrap();
        l.feedback_phase3(&feedback).unwrap();
        l.finalize_feedback(&feedback).unwrap();

        let entries = l.table().entry_count();
        l.reset_episode();
        assert!(!l.has_terminated());
        assert_eq!(l.current_state(), &StateId::new("s0"));
        assert_eq!(l.accumulated_reward(), 0.0);
        // learned values survive an episode reset
        assert_eq!(l.table().entry_count(), entries);

        l.reset_all();
        let s0 = GeneralizedState::single(ParticipantId::new("x"), StateId::new("s0"));
        let go = GeneralizedAction::single(ParticipantId::new("x"), ActionId::new("go"));
        assert_eq!(l.table().value(&s0, &go), Some(0.0));
    }
}
