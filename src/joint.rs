//! Generalized (possibly joint) state and action keys.
//!
//! A `GeneralizedState` maps each participant in some subset of learners to
//! that participant's individual state; a `GeneralizedAction` does the same
//! for actions. Both are value types with structural, order-independent
//! equality and hashing, which makes them usable as table keys at any
//! abstraction level: a one-entry key is an individual state/action, a
//! multi-entry key is a joint one.
//!
//! Keys are backed by `BTreeMap` so that iterating participants is always in
//! ascending identity order; every enumeration the engine performs over keys
//! is therefore deterministic.

use crate::types::{ActionId, ParticipantId, StateId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An immutable mapping from participant identity to that participant's
/// individual state. Invariant: non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneralizedState {
    components: BTreeMap<ParticipantId, StateId>,
}

/// An immutable mapping from participant identity to that participant's
/// individual action. Invariant: non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneralizedAction {
    components: BTreeMap<ParticipantId, ActionId>,
}

macro_rules! impl_generalized_key {
    ($name:ident, $component:ty) => {
        impl $name {
            /// Creates a key with a single participant's component.
            pub fn single(participant: ParticipantId, component: $component) -> Self {
                let mut components = BTreeMap::new();
                components.insert(participant, component);
                Self { components }
            }

            /// Creates a key from an existing participant → component mapping.
            ///
            /// Returns `None` if the mapping is empty (keys are never empty).
            pub fn from_components(
                components: BTreeMap<ParticipantId, $component>,
            ) -> Option<Self> {
                if components.is_empty() {
                    None
                } else {
                    Some(Self { components })
                }
            }

            /// Iterates the participants named in this key, in ascending
            /// identity order.
            pub fn participants(&self) -> impl Iterator<Item = &ParticipantId> {
                self.components.keys()
            }

            /// Returns the component recorded for one participant, if named.
            pub fn get(&self, participant: &ParticipantId) -> Option<&$component> {
                self.components.get(participant)
            }

            /// Returns a copy of this key with one participant's component
            /// inserted or replaced.
            pub fn with(&self, participant: ParticipantId, component: $component) -> Self {
                let mut components = self.components.clone();
                components.insert(participant, component);
                Self { components }
            }

            /// Projects this key onto a subset of its participants.
            ///
            /// Returns `None` if the subset shares no participant with the
            /// key (the projection would be empty).
            pub fn project<'a, I>(&self, subset: I) -> Option<Self>
            where
                I: IntoIterator<Item = &'a ParticipantId>,
            {
                let components: BTreeMap<_, _> = subset
                    .into_iter()
                    .filter_map(|p| self.components.get(p).map(|c| (p.clone(), c.clone())))
                    .collect();
                Self::from_components(components)
            }

            /// The number of participants named in this key.
            pub fn len(&self) -> usize {
                self.components.len()
            }

            /// Always `false`: keys are non-empty by construction.
            pub fn is_empty(&self) -> bool {
                false
            }

            /// `true` when the key spans more than one participant.
            pub fn is_joint(&self) -> bool {
                self.components.len() > 1
            }

            /// `true` when the key names the given participant.
            pub fn contains(&self, participant: &ParticipantId) -> bool {
                self.components.contains_key(participant)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{{")?;
                for (i, (p, c)) in self.components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", p, c)?;
                }
                write!(f, "}}")
            }
        }
    };
}

impl_generalized_key!(GeneralizedState, StateId);
impl_generalized_key!(GeneralizedAction, ActionId);

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    #[test]
    fn test_structural_equality_order_independent() {
        let mut a = BTreeMap::new();
        a.insert(pid("x"), StateId::new("s1"));
        a.insert(pid("y"), StateId::new("s2"));

        let mut b = BTreeMap::new();
        b.insert(pid("y"), StateId::new("s2"));
        b.insert(pid("x"), StateId::new("s1"));

        let ga = GeneralizedState::from_components(a).unwrap();
        let gb = GeneralizedState::from_components(b).unwrap();
        assert_eq!(ga, gb);

        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut ha = DefaultHasher::new();
        ga.hash(&mut ha);
        let mut hb = DefaultHasher::new();
        gb.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(GeneralizedState::from_components(BTreeMap::new()).is_none());
        assert!(GeneralizedAction::from_components(BTreeMap::new()).is_none());
    }

    #[test]
    fn test_single_and_joint() {
        let s = GeneralizedState::single(pid("x"), StateId::new("s1"));
        assert_eq!(s.len(), 1);
        assert!(!s.is_joint());

        let j = s.with(pid("y"), StateId::new("s2"));
        assert!(j.is_joint());
        assert_eq!(j.len(), 2);
        // the source key is untouched
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_projection() {
        let j = GeneralizedAction::single(pid("x"), ActionId::new("up"))
            .with(pid("y"), ActionId::new("down"))
            .with(pid("z"), ActionId::new("left"));

        let subset = [pid("x"), pid("z")];
        let p = j.project(subset.iter()).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.get(&pid("x")), Some(&ActionId::new("up")));
        assert_eq!(p.get(&pid("z")), Some(&ActionId::new("left")));
        assert!(!p.contains(&pid("y")));

        // projecting onto a disjoint set yields nothing
        let none = j.project([pid("w")].iter());
        assert!(none.is_none());
    }

    #[test]
    fn test_participants_sorted() {
        let j = GeneralizedState::single(pid("b"), StateId::new("s"))
            .with(pid("a"), StateId::new("s"))
            .with(pid("c"), StateId::new("s"));
        let order: Vec<_> = j.participants().map(|p| p.as_str().to_string()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_serialize_round_trip() {
        let j = GeneralizedState::single(pid("x"), StateId::new("s1"))
            .with(pid("y"), StateId::new("s2"));
        let json = serde_json::to_string(&j).unwrap();
        let back: GeneralizedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, j);
    }
}
