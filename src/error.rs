//! Error types for the OPPORTUNE engine.
//!
//! Only protocol violations propagate out of the core: an empty action set
//! marks the participant terminal, and a failed negotiation falls back to an
//! individual action, so neither is an error.

use crate::protocol::Phase;
use crate::types::ParticipantId;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error enum for the `opportune` crate.
#[derive(Debug)]
pub enum Error {
    /// A phase was invoked out of order, or a participant tried to finalize
    /// an action inconsistent with its own last computed choice. Signals a
    /// driver bug; the run must abort.
    Protocol {
        /// The offending participant.
        participant: ParticipantId,
        /// The phase in which the violation was detected.
        phase: Phase,
        /// What went wrong.
        detail: String,
    },
    /// An error in learner or engine configuration.
    Config(String),
    /// An unexpected internal error, which indicates a bug.
    Internal(String),
}

impl Error {
    /// Shorthand for a protocol violation.
    pub fn protocol(participant: &ParticipantId, phase: Phase, detail: impl Into<String>) -> Self {
        Error::Protocol {
            participant: participant.clone(),
            phase,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Protocol {
                participant,
                phase,
                detail,
            } => write!(
                f,
                "Protocol violation by {} in {:?}: {}",
                participant, phase, detail
            ),
            Error::Config(s) => write!(f, "Configuration error: {}", s),
            Error::Internal(s) => write!(f, "Internal error: {}", s),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::protocol(
            &ParticipantId::new("agent_1"),
            Phase::Act3,
            "phase1 not completed",
        );
        let text = format!("{}", err);
        assert!(text.contains("agent_1"));
        assert!(text.contains("Act3"));

        let err = Error::Config("alpha out of range".into());
        assert_eq!(format!("{}", err), "Configuration error: alpha out of range");
    }

    #[test]
    fn test_error_is_error_trait() {
        let err = Error::Internal("boom".into());
        let _: &dyn std::error::Error = &err;
    }
}
