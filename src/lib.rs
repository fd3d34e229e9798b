//! A decentralized multi-agent reinforcement-learning engine built around
//! opportunistic joint-action negotiation.
//!
//! Learners keep sparse, lazily-grown value tables keyed by generalized
//! (possibly joint) states and actions, negotiate joint actions with their
//! declared neighbors through typed bid/reply/adoption messages, and widen
//! their abstractions one component at a time when reward feedback turns
//! volatile. Everything is driven through a strict four-phase barrier
//! protocol, so the whole engine is deterministic given the exploration
//! strategy's random draws.
//!
//! The crate also ships two non-negotiating baselines speaking the same
//! protocol (tabular Q-learning and the Weighted Policy Learner), the
//! cliff-walking reference gridworld, and an episode driver.
//!
//! # Example
//!
//! ```
//! use opportune::{
//!     CliffWalking, EpisodeRunner, EpsilonGreedy, ParticipantId, QLearner, StateId,
//! };
//! use std::rc::Rc;
//!
//! let env = Rc::new(CliffWalking::new());
//! let learner = QLearner::new(
//!     ParticipantId::new("walker"),
//!     env.clone(),
//!     StateId::new("1_1"),
//!     StateId::new("12_1"),
//!     0.3,
//!     0.9,
//!     Box::new(EpsilonGreedy::new(0.2, 0.0)),
//! );
//!
//! let mut runner = EpisodeRunner::new(CliffWalking::new());
//! runner.register(Box::new(learner)).unwrap();
//! runner.run_episode(Some(500)).unwrap();
//! assert!(runner.steps() <= 500);
//! ```

pub mod comm;
pub mod config;
pub mod env;
pub mod error;
pub mod exploration;
pub mod joint;
pub mod opportune;
pub mod protocol;
pub mod q_learning;
pub mod runner;
pub mod table;
pub mod types;
pub mod wpl;

pub use comm::{Adoption, Bid, CommLayer, Reply, Snapshot};
pub use config::LearningParams;
pub use env::{CliffWalking, Environment, EnvironmentModel};
pub use error::{Error, Result};
pub use exploration::{Boltzmann, EpsilonGreedy, ExplorationStrategy};
pub use joint::{GeneralizedAction, GeneralizedState};
pub use opportune::{OpportuneConfig, OpportuneLearner};
pub use protocol::{ActInput, FeedbackInput, Learner, Phase, PhaseTracker};
pub use q_learning::QLearner;
pub use runner::EpisodeRunner;
pub use table::{coefficient_of_variation, ValueTable};
pub use types::{ActionId, ParticipantId, StateId};
pub use wpl::{Wpl, WplConfig};

/// The crate version, from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
