//! Subset-lattice search over generalized states.
//!
//! Subsets are enumerated by size, then lexicographically within a size,
//! over the already-sorted participant list. All "first found" tie-breaks in
//! the engine refer to this order (or to the table's ascending key order),
//! so repeated runs over the same table make the same choices.

use crate::joint::GeneralizedState;
use crate::table::ValueTable;
use crate::types::{ParticipantId, StateId};

fn combinations(items: &[ParticipantId], k: usize) -> Vec<Vec<ParticipantId>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    if k > items.len() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for i in 0..=items.len() - k {
        for mut tail in combinations(&items[i + 1..], k - 1) {
            let mut subset = Vec::with_capacity(k);
            subset.push(items[i].clone());
            subset.append(&mut tail);
            out.push(subset);
        }
    }
    out
}

/// All non-empty subsets of `participants` that contain `member`, by size
/// then lexicographic order. With `proper_only`, the full set is excluded.
///
/// The cost is exponential in the participant count; keys are capped at the
/// neighbor-set size plus one, so callers should keep neighbor sets small.
pub(crate) fn subsets_containing(
    participants: &[ParticipantId],
    member: &ParticipantId,
    proper_only: bool,
) -> Vec<Vec<ParticipantId>> {
    let max = if proper_only {
        participants.len().saturating_sub(1)
    } else {
        participants.len()
    };
    let mut out = Vec::new();
    for size in 1..=max {
        for subset in combinations(participants, size) {
            if subset.iter().any(|p| p == member) {
                out.push(subset);
            }
        }
    }
    out
}

/// The proper substate of `gstate` (containing `member`) with the greatest
/// known maximum action value, or `None` when no substate is in the table.
/// Ties keep the first subset found in enumeration order.
pub(crate) fn best_substate(
    table: &ValueTable,
    gstate: &GeneralizedState,
    member: &ParticipantId,
) -> Option<GeneralizedState> {
    let participants: Vec<ParticipantId> = gstate.participants().cloned().collect();
    let mut best: Option<(GeneralizedState, f64)> = None;
    for subset in subsets_containing(&participants, member, true) {
        let Some(candidate) = gstate.project(subset.iter()) else {
            continue;
        };
        let Some(max) = table.max_value(&candidate) else {
            continue;
        };
        match &best {
            Some((_, value)) if *value >= max => {}
            _ => best = Some((candidate, max)),
        }
    }
    best.map(|(state, _)| state)
}

/// The known generalized state whose component for `member` equals
/// `new_state` and whose maximum action value is greatest, scanning the
/// table in ascending key order. States with no actions are skipped.
pub(crate) fn best_state_for(
    table: &ValueTable,
    member: &ParticipantId,
    new_state: &StateId,
) -> Option<GeneralizedState> {
    let mut best: Option<(GeneralizedState, f64)> = None;
    for state in table.states() {
        if state.get(member) != Some(new_state) {
            continue;
        }
        let Some(max) = table.max_value(state) else {
            continue;
        };
        match &best {
            Some((_, value)) if *value >= max => {}
            _ => best = Some((state.clone(), max)),
        }
    }
    best.map(|(state, _)| state)
}
