//! The barrier-enforcing episode driver.
//!
//! One runner owns an environment model and a set of learners and drives
//! them phase by phase: every learner finishes a phase before any learner
//! starts the next one. The runner is what turns the per-participant phase
//! contract into the global barrier the negotiation protocol relies on.

use crate::env::EnvironmentModel;
use crate::error::{Error, Result};
use crate::protocol::{ActInput, FeedbackInput, Learner};

/// Drives a set of learners through timesteps and episodes.
pub struct EpisodeRunner<M: EnvironmentModel> {
    model: M,
    learners: Vec<Box<dyn Learner>>,
    episodes: u64,
    steps: u64,
    episode_ended: bool,
}

impl<M: EnvironmentModel> EpisodeRunner<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            learners: Vec::new(),
            episodes: 0,
            steps: 0,
            episode_ended: false,
        }
    }

    /// Adds a learner. Names must be unique within a runner.
    pub fn register(&mut self, learner: Box<dyn Learner>) -> Result<()> {
        if self.learners.iter().any(|l| l.name() == learner.name()) {
            return Err(Error::Config(format!(
                "learner {} already registered with the runner",
                learner.name()
            )));
        }
        log::info!("runner registered learner {}", learner.name());
        self.learners.push(learner);
        Ok(())
    }

    /// Runs one timestep: the four act phases, action finalization, the
    /// transition through the model, and the feedback phases.
    ///
    /// Terminated learners sit the step out. A learner may terminate inside
    /// phase 2 (no admissible actions), so the set of active learners is
    /// re-examined at every barrier.
    pub fn run_step(&mut self) -> Result<()> {
        self.steps += 1;
        let input = ActInput::current();

        for l in self.learners.iter_mut().filter(|l| !l.has_terminated()) {
            l.phase1(&input)?;
        }
        for l in self.learners.iter_mut().filter(|l| !l.has_terminated()) {
            l.phase2(&input)?;
        }
        for l in self.learners.iter_mut().filter(|l| !l.has_terminated()) {
            l.phase3(&input)?;
        }
        for l in self.learners.iter_mut().filter(|l| !l.has_terminated()) {
            l.phase4(&input)?;
        }

        let mut feedback: Vec<Option<FeedbackInput>> =
            Vec::with_capacity(self.learners.len());
        for l in self.learners.iter_mut() {
            if l.has_terminated() {
                feedback.push(None);
                continue;
            }
            let (state, action) = l.finalize_action(&input)?;
            let new_state = self.model.transition(&state, &action);
            let reward = self.model.reward(&state, &action, &new_state);
            feedback.push(Some(FeedbackInput::new(reward, new_state)));
        }

        for (l, f) in self.learners.iter_mut().zip(&feedback) {
            if let Some(f) = f {
                l.feedback_phase1(f)?;
            }
        }
        for (l, f) in self.learners.iter_mut().zip(&feedback) {
            if let Some(f) = f {
                l.feedback_phase2(f)?;
            }
        }
        for (l, f) in self.learners.iter_mut().zip(&feedback) {
            if let Some(f) = f {
                l.feedback_phase3(f)?;
            }
        }
        for (l, f) in self.learners.iter_mut().zip(&feedback) {
            if let Some(f) = f {
                l.finalize_feedback(f)?;
            }
        }

        self.episode_ended = self.learners.iter().all(|l| l.has_terminated());
        Ok(())
    }

    /// Resets every learner to the episode start and runs timesteps until
    /// all learners terminate or `max_steps` is reached.
    pub fn run_episode(&mut self, max_steps: Option<u64>) -> Result<()> {
        self.episodes += 1;
        self.steps = 0;
        self.episode_ended = self.learners.is_empty();
        for l in self.learners.iter_mut() {
            l.reset_episode();
        }

        while !self.episode_ended && max_steps.map_or(true, |cap| self.steps < cap) {
            self.run_step()?;
        }
        log::debug!(
            "episode {} finished after {} steps (ended: {})",
            self.episodes,
            self.steps,
            self.episode_ended
        );
        Ok(())
    }

    /// Resets counters and every learner, including learned values.
    pub fn reset_all(&mut self) {
        self.episodes = 0;
        self.steps = 0;
        self.episode_ended = self.learners.is_empty();
        for l in self.learners.iter_mut() {
            l.reset_all();
        }
    }

    /// The number of episodes started.
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    /// The number of timesteps run in the current episode.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// `true` once every learner has terminated.
    pub fn has_episode_ended(&self) -> bool {
        self.episode_ended
    }

    /// The environment model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// A registered learner by name.
    pub fn learner(&self, name: &crate::types::ParticipantId) -> Option<&dyn Learner> {
        self.learners
            .iter()
            .find(|l| l.name() == name)
            .map(|l| l.as_ref())
    }

    /// The registered learners, in registration order.
    pub fn learners(&self) -> impl Iterator<Item = &dyn Learner> {
        self.learners.iter().map(|l| l.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::exploration::EpsilonGreedy;
    use crate::q_learning::QLearner;
    use crate::types::{ActionId, ParticipantId, StateId};
    use std::rc::Rc;

    /// Three cells in a row, one action, goal on the right.
    struct LineWorld;

    impl Environment for LineWorld {
        fn available_actions(&self, state: &StateId) -> Vec<ActionId> {
            if state == &StateId::new("s2") {
                Vec::new()
            } else {
                vec![ActionId::new("right")]
            }
        }
    }

    impl EnvironmentModel for LineWorld {
        fn starting_state(&self) -> StateId {
            StateId::new("s0")
        }

        fn goal_state(&self) -> StateId {
            StateId::new("s2")
        }

        fn transition(&self, state: &StateId, _action: &ActionId) -> StateId {
            match state.as_str() {
                "s0" => StateId::new("s1"),
                "s1" => StateId::new("s2"),
                _ => state.clone(),
            }
        }

        fn reward(&self, _state: &StateId, _action: &ActionId, new_state: &StateId) -> f64 {
            if new_state == &self.goal_state() {
                10.0
            } else {
                0.0
            }
        }
    }

    fn q_learner(name: &str) -> Box<QLearner> {
        Box::new(QLearner::new(
            ParticipantId::new(name),
            Rc::new(LineWorld),
            StateId::new("s0"),
            StateId::new("s2"),
            0.3,
            0.9,
            Box::new(EpsilonGreedy::greedy()),
        ))
    }

    #[test]
    fn test_register_rejects_duplicate_names() {
        let mut runner = EpisodeRunner::new(LineWorld);
        runner.register(q_learner("a")).unwrap();
        assert!(runner.register(q_learner("a")).is_err());
        runner.register(q_learner("b")).unwrap();
    }

    #[test]
    fn test_episode_runs_to_termination() {
        let mut runner = EpisodeRunner::new(LineWorld);
        runner.register(q_learner("a")).unwrap();
        runner.register(q_learner("b")).unwrap();

        runner.run_episode(None).unwrap();
        assert!(runner.has_episode_ended());
        assert_eq!(runner.episodes(), 1);
        assert_eq!(runner.steps(), 2);
        for l in runner.learners() {
            assert!(l.has_terminated());
            assert_eq!(l.accumulated_reward(), 10.0);
            assert_eq!(l.current_state(), &StateId::new("s2"));
        }
    }

    #[test]
    fn test_step_cap_stops_the_episode() {
        /// Never reaches a terminal state.
        struct Treadmill;

        impl Environment for Treadmill {
            fn available_actions(&self, _state: &StateId) -> Vec<ActionId> {
                vec![ActionId::new("walk")]
            }
        }

        impl EnvironmentModel for Treadmill {
            fn starting_state(&self) -> StateId {
                StateId::new("s")
            }

            fn goal_state(&self) -> StateId {
                StateId::new("nowhere")
            }

            fn transition(&self, state: &StateId, _action: &ActionId) -> StateId {
                state.clone()
            }

            fn reward(&self, _: &StateId, _: &ActionId, _: &StateId) -> f64 {
                -1.0
            }
        }

        let mut runner = EpisodeRunner::new(Treadmill);
        runner
            .register(Box::new(QLearner::new(
                ParticipantId::new("a"),
                Rc::new(Treadmill),
                StateId::new("s"),
                StateId::new("nowhere"),
                0.3,
                0.9,
                Box::new(EpsilonGreedy::greedy()),
            )))
            .unwrap();

        runner.run_episode(Some(25)).unwrap();
        assert!(!runner.has_episode_ended());
        assert_eq!(runner.steps(), 25);
    }

    #[test]
    fn test_second_episode_resets_counters() {
        let mut runner = EpisodeRunner::new(LineWorld);
        runner.register(q_learner("a")).unwrap();
        runner.run_episode(None).unwrap();
        runner.run_episode(None).unwrap();
        assert_eq!(runner.episodes(), 2);
        assert_eq!(runner.steps(), 2);

        let learner = runner.learner(&ParticipantId::new("a")).unwrap();
        assert_eq!(learner.accumulated_reward(), 10.0);

        runner.reset_all();
        assert_eq!(runner.episodes(), 0);
    }
}
