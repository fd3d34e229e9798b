//! Core identifier types for the OPPORTUNE engine.
//!
//! Participants, individual states, and individual actions are all opaque
//! tokens: the engine only compares, orders, and hashes them. They are
//! string-backed so that any environment encoding (grid cells, route labels,
//! origin-destination pairs) can be used without conversion.

use serde::{Deserialize, Serialize};

/// The identity of one decision-making participant (learner).
///
/// Orderable so that neighbor sets, subset enumeration, and bid resolution
/// have a fixed, documented total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a `ParticipantId` from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One participant's individual (non-joint) state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(String);

impl StateId {
    /// Creates a `StateId` from any string-like value.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StateId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One participant's individual (non-joint) action.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(String);

impl ActionId {
    /// Creates an `ActionId` from any string-like value.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_id_ordering() {
        let a = ParticipantId::new("agent_a");
        let b = ParticipantId::new("agent_b");
        assert!(a < b);
        assert_eq!(a, ParticipantId::from("agent_a"));
    }

    #[test]
    fn test_ids_as_map_keys_serialize() {
        let s = StateId::new("3_2");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"3_2\"");
        let back: StateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_display_round_trip() {
        let a = ActionId::new("right");
        assert_eq!(a.to_string(), "right");
        assert_eq!(a.as_str(), "right");
    }
}
