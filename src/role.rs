//! Role, leader-view, and role-change event types.

use crate::cluster::NodeId;
use crate::term::Term;

/// One of the three Raft roles, restricted to the election subset (no log
/// replication state attaches to any of them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// Published on every role entry. Delivered at-least-once per transition
/// to subscribers of `ElectionHandle::listen()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionEvent {
    BecameFollower { term: Term },
    BecameCandidate { term: Term },
    BecameLeader { term: Term },
}

impl ElectionEvent {
    pub fn term(&self) -> Term {
        match self {
            Self::BecameFollower { term }
            | Self::BecameCandidate { term }
            | Self::BecameLeader { term } => *term,
        }
    }
}

/// A node's view of who currently leads its election group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderView {
    pub local_id: NodeId,
    pub known_leader: Option<NodeId>,
}

/// Internal transition notification fed into the driver's actor loop on
/// every role entry. Kept separate from `ElectionEvent`: this one drives
/// the driver's own reaction (start a vote round, begin heartbeating)
/// while `ElectionEvent` is purely for external subscribers. Modeled as a
/// tagged variant rather than three independent callbacks per the design
/// guidance, so ordering is trivially exact (one channel, one producer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoleTransition {
    EnteredFollower,
    EnteredCandidate,
    EnteredLeader,
}
