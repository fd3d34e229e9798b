//! Bid bookkeeping and deterministic negotiation resolution.

use crate::comm::{Bid, Reply};
use crate::joint::GeneralizedAction;
use crate::types::ParticipantId;
use std::collections::BTreeMap;

/// Per-timestep negotiation scratch. At most one of the two options is
/// meaningful when the action is finalized: a participant either stands by
/// its own proposal or has accepted someone else's bid.
#[derive(Debug, Default)]
pub(crate) struct NegotiationState {
    /// The joint action this participant proposed in phase 2, if any.
    pub proposed: Option<GeneralizedAction>,
    /// The bid this participant accepted in phase 3, if any.
    pub accepted: Option<Bid>,
}

impl NegotiationState {
    pub fn clear(&mut self) {
        self.proposed = None;
        self.accepted = None;
    }
}

/// Sorts the bids by proposer identity and returns the index of the bid to
/// accept, if any.
///
/// A bid is acceptable only when its carried value strictly exceeds
/// `own_estimate` (the recipient's value for its own current choice). Among
/// acceptable bids the strictly greatest value wins; on equal values the
/// earlier proposer identity wins. The identity order makes the resolution
/// independent of delivery order within the phase.
pub(crate) fn select_acceptable_bid(bids: &mut [Bid], own_estimate: f64) -> Option<usize> {
    bids.sort_by(|a, b| a.proposer.cmp(&b.proposer));
    let mut best: Option<usize> = None;
    for (i, bid) in bids.iter().enumerate() {
        if bid.value <= own_estimate {
            continue;
        }
        match best {
            Some(j) if bids[j].value >= bid.value => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Counts the participants named in `proposal` (other than the proposer)
/// that did not accept it. A missing reply counts as a rejection.
pub(crate) fn rejection_count(
    proposal: &GeneralizedAction,
    proposer: &ParticipantId,
    replies: &BTreeMap<ParticipantId, Reply>,
) -> usize {
    proposal
        .participants()
        .filter(|p| *p != proposer)
        .filter(|p| replies.get(p) != Some(&Reply::Accept))
        .count()
}
