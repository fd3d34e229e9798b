//! Environment ports and the cliff-walking reference gridworld.
//!
//! Learners consume only [`Environment`]: the available individual actions
//! for an individual state, with an empty set meaning the state is terminal.
//! The episode driver additionally needs the transition and reward model,
//! which [`EnvironmentModel`] adds on top.

use crate::types::{ActionId, StateId};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// The learner-facing slice of an environment.
pub trait Environment {
    /// The individual actions available in `state`. Empty means terminal.
    fn available_actions(&self, state: &StateId) -> Vec<ActionId>;
}

/// The driver-facing slice: dynamics and rewards on top of [`Environment`].
pub trait EnvironmentModel: Environment {
    /// The state every learner starts an episode in.
    fn starting_state(&self) -> StateId;

    /// The goal state.
    fn goal_state(&self) -> StateId;

    /// The state reached by applying `action` in `state`. Unknown pairs
    /// leave the state unchanged.
    fn transition(&self, state: &StateId, action: &ActionId) -> StateId;

    /// The reward for the transition `state --action--> new_state`.
    fn reward(&self, state: &StateId, action: &ActionId, new_state: &StateId) -> f64;
}

impl<E: Environment + ?Sized> Environment for Rc<E> {
    fn available_actions(&self, state: &StateId) -> Vec<ActionId> {
        (**self).available_actions(state)
    }
}

impl<E: EnvironmentModel + ?Sized> EnvironmentModel for Rc<E> {
    fn starting_state(&self) -> StateId {
        (**self).starting_state()
    }

    fn goal_state(&self) -> StateId {
        (**self).goal_state()
    }

    fn transition(&self, state: &StateId, action: &ActionId) -> StateId {
        (**self).transition(state, action)
    }

    fn reward(&self, state: &StateId, action: &ActionId, new_state: &StateId) -> f64 {
        (**self).reward(state, action, new_state)
    }
}

/// The classic cliff-walking gridworld, 12 columns by 4 rows.
///
/// States are named `x_y` with 1-based coordinates. The bottom row between
/// the start `1_1` and the goal `12_1` is the cliff; cliff and goal states
/// have no actions. Bumping into a wall leaves the agent in place.
///
/// Rewards: +100 for reaching the goal, -100 for falling off the cliff,
/// -10 for a wall bump, -1 for any other step.
#[derive(Debug, Clone)]
pub struct CliffWalking {
    transitions: BTreeMap<StateId, BTreeMap<ActionId, StateId>>,
    cliff: BTreeSet<StateId>,
    starting: StateId,
    goal: StateId,
}

const WIDTH: u32 = 12;
const HEIGHT: u32 = 4;

fn cell(x: u32, y: u32) -> StateId {
    StateId::new(format!("{}_{}", x, y))
}

impl CliffWalking {
    pub fn new() -> Self {
        let starting = cell(1, 1);
        let goal = cell(WIDTH, 1);
        let mut transitions = BTreeMap::new();
        let mut cliff = BTreeSet::new();

        for x in 1..=WIDTH {
            for y in 1..=HEIGHT {
                let state = cell(x, y);

                // the bottom row past the start holds the cliff and the goal
                if y == 1 && x > 1 {
                    if state != goal {
                        cliff.insert(state.clone());
                    }
                    transitions.insert(state, BTreeMap::new());
                    continue;
                }

                let mut moves = BTreeMap::new();
                moves.insert(
                    ActionId::new("up"),
                    if y == HEIGHT { state.clone() } else { cell(x, y + 1) },
                );
                moves.insert(
                    ActionId::new("down"),
                    if y == 1 { state.clone() } else { cell(x, y - 1) },
                );
                moves.insert(
                    ActionId::new("right"),
                    if x == WIDTH { state.clone() } else { cell(x + 1, y) },
                );
                moves.insert(
                    ActionId::new("left"),
                    if x == 1 { state.clone() } else { cell(x - 1, y) },
                );
                transitions.insert(state, moves);
            }
        }

        Self {
            transitions,
            cliff,
            starting,
            goal,
        }
    }

    /// `true` when `state` is one of the cliff cells.
    pub fn is_cliff(&self, state: &StateId) -> bool {
        self.cliff.contains(state)
    }
}

impl Default for CliffWalking {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for CliffWalking {
    fn available_actions(&self, state: &StateId) -> Vec<ActionId> {
        self.transitions
            .get(state)
            .map(|moves| moves.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl EnvironmentModel for CliffWalking {
    fn starting_state(&self) -> StateId {
        self.starting.clone()
    }

    fn goal_state(&self) -> StateId {
        self.goal.clone()
    }

    fn transition(&self, state: &StateId, action: &ActionId) -> StateId {
        self.transitions
            .get(state)
            .and_then(|moves| moves.get(action))
            .cloned()
            .unwrap_or_else(|| state.clone())
    }

    fn reward(&self, state: &StateId, _action: &ActionId, new_state: &StateId) -> f64 {
        if *new_state == self.goal {
            100.0
        } else if self.cliff.contains(new_state) {
            -100.0
        } else if state == new_state {
            -10.0
        } else {
            -1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_shape() {
        let env = CliffWalking::new();
        assert_eq!(env.starting_state(), StateId::new("1_1"));
        assert_eq!(env.goal_state(), StateId::new("12_1"));
        // 10 cliff cells between start and goal
        assert_eq!(env.cliff.len(), 10);
    }

    #[test]
    fn test_normal_state_has_four_actions() {
        let env = CliffWalking::new();
        let actions = env.available_actions(&StateId::new("5_3"));
        assert_eq!(actions.len(), 4);
    }

    #[test]
    fn test_terminal_states_have_no_actions() {
        let env = CliffWalking::new();
        assert!(env.available_actions(&StateId::new("12_1")).is_empty());
        assert!(env.available_actions(&StateId::new("6_1")).is_empty());
    }

    #[test]
    fn test_wall_bump_stays_in_place() {
        let env = CliffWalking::new();
        let corner = StateId::new("1_4");
        assert_eq!(env.transition(&corner, &ActionId::new("up")), corner);
        assert_eq!(env.transition(&corner, &ActionId::new("left")), corner);
        assert_eq!(
            env.transition(&corner, &ActionId::new("right")),
            StateId::new("2_4")
        );
    }

    #[test]
    fn test_rewards() {
        let env = CliffWalking::new();
        let up = ActionId::new("up");
        assert_eq!(
            env.reward(&StateId::new("11_2"), &up, &StateId::new("12_1")),
            100.0
        );
        assert_eq!(
            env.reward(&StateId::new("5_2"), &up, &StateId::new("5_1")),
            -100.0
        );
        assert_eq!(
            env.reward(&StateId::new("1_4"), &up, &StateId::new("1_4")),
            -10.0
        );
        assert_eq!(
            env.reward(&StateId::new("1_2"), &up, &StateId::new("1_3")),
            -1.0
        );
    }

    #[test]
    fn test_start_escapes_the_cliff_upward() {
        let env = CliffWalking::new();
        let start = StateId::new("1_1");
        assert_eq!(env.transition(&start, &ActionId::new("up")), StateId::new("1_2"));
        // stepping right from the start falls off the cliff
        assert!(env.is_cliff(&env.transition(&start, &ActionId::new("right"))));
    }
}
