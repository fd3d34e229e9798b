//! The four-phase barrier protocol contract.
//!
//! Every participant implements [`Learner`]. An external driver invokes one
//! phase across *all* participants before any participant begins the next
//! phase; order among participants within a phase is unspecified and must
//! not be relied upon. The strict global barrier per phase is what makes
//! decentralized negotiation possible without shared memory: a participant
//! may only read another participant's protocol-exposed state during phases
//! it is guaranteed the other has already executed its corresponding phase.
//!
//! [`PhaseTracker`] enforces the per-participant state machine; any
//! out-of-order invocation is a fatal [`crate::Error::Protocol`].

use crate::error::{Error, Result};
use crate::types::{ActionId, ParticipantId, StateId};
use serde::{Deserialize, Serialize};

/// One step of the per-participant protocol state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Act1,
    Act2,
    Act3,
    Act4,
    FinalizeAction,
    Feedback1,
    Feedback2,
    Feedback3,
    FinalizeFeedback,
}

impl Phase {
    fn next(self) -> Phase {
        match self {
            Phase::Act1 => Phase::Act2,
            Phase::Act2 => Phase::Act3,
            Phase::Act3 => Phase::Act4,
            Phase::Act4 => Phase::FinalizeAction,
            Phase::FinalizeAction => Phase::Feedback1,
            Phase::Feedback1 => Phase::Feedback2,
            Phase::Feedback2 => Phase::Feedback3,
            Phase::Feedback3 => Phase::FinalizeFeedback,
            Phase::FinalizeFeedback => Phase::Act1,
        }
    }
}

/// Tracks which phase a participant must execute next and rejects anything
/// else.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    expected: Phase,
}

impl PhaseTracker {
    /// A fresh tracker, expecting `Act1`.
    pub fn new() -> Self {
        Self {
            expected: Phase::Act1,
        }
    }

    /// Records that `phase` is being executed by `participant`.
    ///
    /// Fails with a protocol violation when `phase` is not the expected next
    /// phase.
    pub fn advance(&mut self, participant: &ParticipantId, phase: Phase) -> Result<()> {
        if phase != self.expected {
            return Err(Error::protocol(
                participant,
                phase,
                format!("expected {:?}", self.expected),
            ));
        }
        self.expected = phase.next();
        Ok(())
    }

    /// Records a feedback phase, distinguishing the pre-action case.
    ///
    /// Returns `false` without advancing when the tracker still expects
    /// `Act1`, i.e. feedback arrived before any action in the current
    /// timestep. Environments may deliver such a round right after a reset;
    /// it is not a violation, and learners decide whether to process it.
    pub fn advance_feedback(
        &mut self,
        participant: &ParticipantId,
        phase: Phase,
    ) -> Result<bool> {
        if self.expected == Phase::Act1 {
            return Ok(false);
        }
        self.advance(participant, phase)?;
        Ok(true)
    }

    /// The phase expected next.
    pub fn expecting(&self) -> Phase {
        self.expected
    }

    /// Resets the tracker to the start of a timestep.
    pub fn reset(&mut self) {
        self.expected = Phase::Act1;
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Input to the act phases.
///
/// By default a participant reasons about its own current state; an
/// environment that must pre-compute an action before applying it (e.g. a
/// simulator requiring a pre-registered route) supplies the state, and
/// optionally a restricted available-action subset, explicitly.
#[derive(Debug, Clone, Default)]
pub struct ActInput {
    /// The state to reason about; `None` means the participant's own current
    /// state.
    pub state: Option<StateId>,
    /// When set, only actions whose own-participant component is in this
    /// subset are admissible.
    pub available_actions: Option<Vec<ActionId>>,
}

impl ActInput {
    /// Reason about the participant's current state, all actions available.
    pub fn current() -> Self {
        Self::default()
    }

    /// Reason about an externally supplied state.
    pub fn from_state(state: StateId) -> Self {
        Self {
            state: Some(state),
            available_actions: None,
        }
    }

    /// Restricts the admissible individual actions.
    pub fn with_available(mut self, actions: Vec<ActionId>) -> Self {
        self.available_actions = Some(actions);
        self
    }
}

/// Input to the feedback phases, mirroring [`ActInput`]'s optional override:
/// when the reward arrives later than the action choice, the environment
/// names the `(state, action)` pair the feedback belongs to.
#[derive(Debug, Clone)]
pub struct FeedbackInput {
    /// The reward for the acted transition.
    pub reward: f64,
    /// The participant's new individual state.
    pub new_state: StateId,
    /// The individual `(state, action)` pair this feedback belongs to, when
    /// it is not the most recent one.
    pub previous: Option<(StateId, ActionId)>,
}

impl FeedbackInput {
    /// Feedback for the most recently acted pair.
    pub fn new(reward: f64, new_state: StateId) -> Self {
        Self {
            reward,
            new_state,
            previous: None,
        }
    }

    /// Names the pair the feedback belongs to explicitly.
    pub fn with_previous(mut self, state: StateId, action: ActionId) -> Self {
        self.previous = Some((state, action));
        self
    }
}

/// The participant contract driven by the environment, one phase across all
/// participants per barrier.
///
/// A participant whose available-action set is empty flags itself terminal
/// ([`Learner::has_terminated`]) and must not be driven again until reset.
pub trait Learner {
    /// The participant's identity.
    fn name(&self) -> &ParticipantId;

    /// Act phase 1: fix the individual state being reasoned about.
    fn phase1(&mut self, input: &ActInput) -> Result<()>;

    /// Act phase 2: choose a candidate (possibly joint) action and send
    /// proposals.
    fn phase2(&mut self, input: &ActInput) -> Result<()>;

    /// Act phase 3: examine received proposals and reply.
    fn phase3(&mut self, input: &ActInput) -> Result<()>;

    /// Act phase 4: resolve the negotiation, falling back if it failed.
    fn phase4(&mut self, input: &ActInput) -> Result<()>;

    /// Returns the individual `(state, action)` to apply. Always individual,
    /// even when the effective action was decided jointly.
    fn finalize_action(&mut self, input: &ActInput) -> Result<(StateId, ActionId)>;

    /// Feedback phase 1: identify the acted pair the feedback belongs to.
    fn feedback_phase1(&mut self, feedback: &FeedbackInput) -> Result<()>;

    /// Feedback phase 2 (barrier only for some algorithms).
    fn feedback_phase2(&mut self, feedback: &FeedbackInput) -> Result<()>;

    /// Feedback phase 3 (barrier only for some algorithms).
    fn feedback_phase3(&mut self, feedback: &FeedbackInput) -> Result<()>;

    /// Final feedback phase: update the value structures and advance state.
    fn finalize_feedback(&mut self, feedback: &FeedbackInput) -> Result<()>;

    /// `true` once the participant reached its goal or ran out of actions.
    fn has_terminated(&self) -> bool;

    /// The participant's current individual state.
    fn current_state(&self) -> &StateId;

    /// Reward accumulated over the current episode.
    fn accumulated_reward(&self) -> f64;

    /// Resets episode-scoped state (current state, negotiation scratch).
    fn reset_episode(&mut self);

    /// Resets everything, including learned values.
    fn reset_all(&mut self);
}
