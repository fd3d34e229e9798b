//! The negotiation communication layer.
//!
//! A process-wide registry mapping participant identity to a mailbox, used
//! only for message delivery (bid push, reply push, adoption push) and for
//! small read-only snapshots of each participant's last-known individual
//! state and action. Participants never reach into each other's value
//! tables; every cross-participant read during negotiation goes through
//! these typed messages or snapshot accessors.
//!
//! Single-threaded by design: the protocol's phase barriers are the only
//! synchronization, so interior mutability through `RefCell` is enough and
//! the layer is shared as `Rc<CommLayer>`.

use crate::error::{Error, Result};
use crate::joint::{GeneralizedAction, GeneralizedState};
use crate::types::{ActionId, ParticipantId, StateId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A proposal that the recipient adopt `action` as its part of a joint
/// action. Alive only between phase 2 and phase 4 of one timestep.
#[derive(Debug, Clone)]
pub struct Bid {
    /// Who proposed the joint action.
    pub proposer: ParticipantId,
    /// The recipient's individual component of the proposed joint action.
    pub action: ActionId,
    /// The proposer's current value estimate for the proposed joint
    /// (state, action).
    pub value: f64,
}

/// A phase-3 answer to a bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Accept,
    Reject,
}

/// Pushed by a successful proposer in phase 4: every named participant
/// adopts the same joint action and the proposer's chosen generalized state.
#[derive(Debug, Clone)]
pub struct Adoption {
    pub action: GeneralizedAction,
    pub state: GeneralizedState,
}

/// Read-only, explicitly published view of a participant. Everything else a
/// participant knows stays private.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Last-known individual state.
    pub state: Option<StateId>,
    /// Last chosen individual action.
    pub action: Option<ActionId>,
    /// The individual state of the transition currently being credited.
    pub feedback_state: Option<StateId>,
    /// The individual action of the transition currently being credited.
    pub feedback_action: Option<ActionId>,
    /// The individual state reached by that transition.
    pub feedback_new_state: Option<StateId>,
    /// `true` while the participant has accepted someone's bid this
    /// timestep.
    pub accepted_elsewhere: bool,
}

#[derive(Debug, Default)]
struct Mailbox {
    bids: Vec<Bid>,
    replies: BTreeMap<ParticipantId, Reply>,
    adoption: Option<Adoption>,
    snapshot: Snapshot,
}

/// The identity → mailbox registry.
#[derive(Debug, Default)]
pub struct CommLayer {
    mailboxes: RefCell<BTreeMap<ParticipantId, Mailbox>>,
}

impl CommLayer {
    /// Creates an empty, shareable layer.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Registers a participant. Each identity may register once per layer.
    pub fn register(&self, participant: &ParticipantId) -> Result<()> {
        let mut mailboxes = self.mailboxes.borrow_mut();
        if mailboxes.contains_key(participant) {
            return Err(Error::Config(format!(
                "participant {} already registered",
                participant
            )));
        }
        mailboxes.insert(participant.clone(), Mailbox::default());
        log::info!("registered participant {}", participant);
        Ok(())
    }

    /// The registered participants, in identity order.
    pub fn participants(&self) -> Vec<ParticipantId> {
        self.mailboxes.borrow().keys().cloned().collect()
    }

    /// Clears one participant's per-timestep negotiation scratch (bids,
    /// replies, adoption, accepted flag). Called in phase 1, before any
    /// participant's phase 2 can deliver new bids.
    pub fn begin_step(&self, participant: &ParticipantId) {
        if let Some(mailbox) = self.mailboxes.borrow_mut().get_mut(participant) {
            mailbox.bids.clear();
            mailbox.replies.clear();
            mailbox.adoption = None;
            mailbox.snapshot.accepted_elsewhere = false;
        }
    }

    /// Delivers a bid to a participant's mailbox (phase 2).
    pub fn push_bid(&self, to: &ParticipantId, bid: Bid) {
        log::debug!(
            "bid {} -> {}: action {} at value {:.4}",
            bid.proposer,
            to,
            bid.action,
            bid.value
        );
        if let Some(mailbox) = self.mailboxes.borrow_mut().get_mut(to) {
            mailbox.bids.push(bid);
        }
    }

    /// Drains the bids received by a participant (phase 3).
    pub fn take_bids(&self, participant: &ParticipantId) -> Vec<Bid> {
        self.mailboxes
            .borrow_mut()
            .get_mut(participant)
            .map(|mailbox| std::mem::take(&mut mailbox.bids))
            .unwrap_or_default()
    }

    /// Delivers a reply to a bid's proposer (phase 3).
    pub fn push_reply(&self, to: &ParticipantId, from: &ParticipantId, reply: Reply) {
        if let Some(mailbox) = self.mailboxes.borrow_mut().get_mut(to) {
            mailbox.replies.insert(from.clone(), reply);
        }
    }

    /// The replies a proposer has received (phase 4). Participants that did
    /// not reply are simply absent.
    pub fn replies(&self, participant: &ParticipantId) -> BTreeMap<ParticipantId, Reply> {
        self.mailboxes
            .borrow()
            .get(participant)
            .map(|mailbox| mailbox.replies.clone())
            .unwrap_or_default()
    }

    /// Delivers a finalized joint action to a named participant (phase 4).
    pub fn push_adoption(&self, to: &ParticipantId, adoption: Adoption) {
        if let Some(mailbox) = self.mailboxes.borrow_mut().get_mut(to) {
            mailbox.adoption = Some(adoption);
        }
    }

    /// Removes and returns a pending adoption (finalize).
    pub fn take_adoption(&self, participant: &ParticipantId) -> Option<Adoption> {
        self.mailboxes
            .borrow_mut()
            .get_mut(participant)
            .and_then(|mailbox| mailbox.adoption.take())
    }

    /// Publishes the participant's current individual state.
    pub fn publish_state(&self, participant: &ParticipantId, state: StateId) {
        if let Some(mailbox) = self.mailboxes.borrow_mut().get_mut(participant) {
            mailbox.snapshot.state = Some(state);
        }
    }

    /// Publishes the participant's last chosen individual action.
    pub fn publish_action(&self, participant: &ParticipantId, action: ActionId) {
        if let Some(mailbox) = self.mailboxes.borrow_mut().get_mut(participant) {
            mailbox.snapshot.action = Some(action);
        }
    }

    /// Publishes the transition being credited this feedback round.
    pub fn publish_feedback(
        &self,
        participant: &ParticipantId,
        state: StateId,
        action: Option<ActionId>,
        new_state: StateId,
    ) {
        if let Some(mailbox) = self.mailboxes.borrow_mut().get_mut(participant) {
            mailbox.snapshot.feedback_state = Some(state);
            mailbox.snapshot.feedback_action = action;
            mailbox.snapshot.feedback_new_state = Some(new_state);
        }
    }

    /// Marks whether the participant accepted a bid this timestep.
    pub fn set_accepted_elsewhere(&self, participant: &ParticipantId, accepted: bool) {
        if let Some(mailbox) = self.mailboxes.borrow_mut().get_mut(participant) {
            mailbox.snapshot.accepted_elsewhere = accepted;
        }
    }

    /// A copy of a participant's published snapshot.
    pub fn snapshot(&self, participant: &ParticipantId) -> Option<Snapshot> {
        self.mailboxes
            .borrow()
            .get(participant)
            .map(|mailbox| mailbox.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let comm = CommLayer::new();
        comm.register(&pid("x")).unwrap();
        assert!(comm.register(&pid("x")).is_err());
        assert_eq!(comm.participants(), vec![pid("x")]);
    }

    #[test]
    fn test_bid_delivery_and_drain() {
        let comm = CommLayer::new();
        comm.register(&pid("x")).unwrap();
        comm.register(&pid("y")).unwrap();

        comm.push_bid(
            &pid("y"),
            Bid {
                proposer: pid("x"),
                action: ActionId::new("up"),
                value: 1.5,
            },
        );
        let bids = comm.take_bids(&pid("y"));
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].proposer, pid("x"));

        // draining empties the mailbox
        assert!(comm.take_bids(&pid("y")).is_empty());
    }

    #[test]
    fn test_replies_and_adoption() {
        let comm = CommLayer::new();
        comm.register(&pid("x")).unwrap();
        comm.register(&pid("y")).unwrap();

        comm.push_reply(&pid("x"), &pid("y"), Reply::Accept);
        let replies = comm.replies(&pid("x"));
        assert_eq!(replies.get(&pid("y")), Some(&Reply::Accept));

        let joint = GeneralizedAction::single(pid("x"), ActionId::new("a"))
            .with(pid("y"), ActionId::new("b"));
        let state = GeneralizedState::single(pid("x"), StateId::new("s"));
        comm.push_adoption(
            &pid("y"),
            Adoption {
                action: joint.clone(),
                state,
            },
        );
        let adoption = comm.take_adoption(&pid("y")).unwrap();
        assert_eq!(adoption.action, joint);
        assert!(comm.take_adoption(&pid("y")).is_none());
    }

    #[test]
    fn test_begin_step_clears_scratch_only() {
        let comm = CommLayer::new();
        comm.register(&pid("x")).unwrap();
        comm.publish_state(&pid("x"), StateId::new("s0"));
        comm.push_bid(
            &pid("x"),
            Bid {
                proposer: pid("y"),
                action: ActionId::new("a"),
                value: 0.0,
            },
        );
        comm.set_accepted_elsewhere(&pid("x"), true);

        comm.begin_step(&pid("x"));
        assert!(comm.take_bids(&pid("x")).is_empty());
        let snapshot = comm.snapshot(&pid("x")).unwrap();
        assert!(!snapshot.accepted_elsewhere);
        // published state survives step boundaries
        assert_eq!(snapshot.state, Some(StateId::new("s0")));
    }
}
