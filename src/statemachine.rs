//! Election state machine: role, term, and known-leader mutation, plus the
//! two timers (election timeout, heartbeat send) that drive it.
//!
//! Exclusively owned by the driver's actor task (see `driver.rs`) -- there
//! is deliberately no internal `Mutex` here. Single-task ownership *is*
//! the serialization point the design calls for.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

use crate::cluster::NodeId;
use crate::role::{ElectionEvent, LeaderView, Role, RoleTransition};
use crate::term::{Term, TermRegister};
use crate::utils::RearmableDeadline;

/// Tunables recognized by the election core. Field-by-field overridable
/// from a TOML config string via `parsed_config!`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Base follower election timeout; the effective timeout drawn on
    /// each (re)arm is uniform over `[election_timeout_ms, 2x)`.
    pub election_timeout_ms: u64,
    /// Leader heartbeat-send period.
    pub heartbeat_interval_ms: u64,
    /// Candidate's per-round deadline for collecting a majority.
    pub vote_timeout_ms: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        ElectionConfig {
            election_timeout_ms: 1000,
            heartbeat_interval_ms: 100,
            vote_timeout_ms: 1000,
        }
    }
}

/// Snapshot of role + term + known leader, published after every mutation
/// so that `currentRole()`/`leaderView()` callers outside the actor task
/// never need to reach into state the actor owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSnapshot {
    pub role: Role,
    pub term: Term,
    pub leader_view: LeaderView,
}

pub(crate) struct ElectionStateMachine {
    id: NodeId,
    role: Role,
    term: TermRegister,
    leader: Option<NodeId>,
    config: ElectionConfig,

    election_timer: RearmableDeadline,
    heartbeat_timer: RearmableDeadline,

    transition_tx: mpsc::UnboundedSender<RoleTransition>,
    events_tx: Option<tokio::sync::broadcast::Sender<ElectionEvent>>,
    snapshot_tx: watch::Sender<RoleSnapshot>,

    rng: rand::rngs::ThreadRng,
}

impl ElectionStateMachine {
    /// Creates a new state machine in Follower role at the given initial
    /// term (0 unless the embedder recovered a prior term), arming the
    /// election timer immediately. Returns the machine along with the
    /// receiving end of its internal transition channel and its published
    /// role-snapshot watch channel.
    pub(crate) fn new(
        id: NodeId,
        initial_term: Term,
        config: ElectionConfig,
        events_tx: tokio::sync::broadcast::Sender<ElectionEvent>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<RoleTransition>,
        watch::Receiver<RoleSnapshot>,
    ) {
        let term = TermRegister::new(initial_term);
        let (transition_tx, transition_rx) = mpsc::unbounded_channel();
        let initial_snapshot = RoleSnapshot {
            role: Role::Follower,
            term: term.current(),
            leader_view: LeaderView { local_id: id.clone(), known_leader: None },
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial_snapshot);

        let mut sm = ElectionStateMachine {
            id,
            role: Role::Follower,
            term,
            leader: None,
            config,
            election_timer: RearmableDeadline::new(),
            heartbeat_timer: RearmableDeadline::new(),
            transition_tx,
            events_tx: Some(events_tx),
            snapshot_tx,
            rng: rand::thread_rng(),
        };
        sm.rearm_election_timer();
        sm.publish_snapshot();
        (sm, transition_rx, snapshot_rx)
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn term(&self) -> Term {
        self.term.current()
    }

    pub(crate) fn term_register(&self) -> TermRegister {
        self.term.clone()
    }

    pub(crate) fn leader_view(&self) -> LeaderView {
        LeaderView { local_id: self.id.clone(), known_leader: self.leader.clone() }
    }

    pub(crate) fn config(&self) -> &ElectionConfig {
        &self.config
    }

    pub(crate) fn election_timer(&self) -> &RearmableDeadline {
        &self.election_timer
    }

    pub(crate) fn heartbeat_timer(&self) -> &RearmableDeadline {
        &self.heartbeat_timer
    }

    fn rearm_election_timer(&mut self) {
        let base = self.config.election_timeout_ms;
        let jittered = if base == 0 {
            0
        } else {
            self.rng.gen_range(base..2 * base)
        };
        self.election_timer.rearm(Duration::from_millis(jittered));
    }

    fn start_heartbeat_timer(&mut self) {
        self.heartbeat_timer
            .rearm(Duration::from_millis(self.config.heartbeat_interval_ms));
    }

    /// Re-arms the heartbeat timer for the next period; called by the
    /// driver after each heartbeat broadcast round while still Leader.
    pub(crate) fn rearm_heartbeat_timer(&mut self) {
        if self.role == Role::Leader {
            self.start_heartbeat_timer();
        }
    }

    fn publish_snapshot(&self) {
        let _ = self.snapshot_tx.send(RoleSnapshot {
            role: self.role,
            term: self.term.current(),
            leader_view: self.leader_view(),
        });
    }

    /// Switches role and performs the associated timer/event bookkeeping.
    /// Returns whether the role actually changed (false if already in
    /// `new_role`).
    fn enter_role(&mut self, new_role: Role) -> bool {
        let changed = self.role != new_role;

        match new_role {
            Role::Follower => {
                self.heartbeat_timer.disarm();
                self.rearm_election_timer();
            }
            Role::Candidate => {
                self.heartbeat_timer.disarm();
                self.rearm_election_timer();
            }
            Role::Leader => {
                self.election_timer.disarm();
                self.start_heartbeat_timer();
            }
        }

        if changed {
            let old_role = self.role;
            self.role = new_role;
            let term = self.term.current();
            pf_info!("{:?} -> {:?} at term {}", old_role, new_role, term);
            let (transition, event) = match new_role {
                Role::Follower => (
                    RoleTransition::EnteredFollower,
                    ElectionEvent::BecameFollower { term },
                ),
                Role::Candidate => (
                    RoleTransition::EnteredCandidate,
                    ElectionEvent::BecameCandidate { term },
                ),
                Role::Leader => (
                    RoleTransition::EnteredLeader,
                    ElectionEvent::BecameLeader { term },
                ),
            };
            // Synchronous, non-blocking hand-off: ordering is exact
            // because this call site is the only writer.
            let _ = self.transition_tx.send(transition);
            if let Some(tx) = &self.events_tx {
                let _ = tx.send(event);
            }
        }

        self.publish_snapshot();
        changed
    }

    /// Follower -> Candidate on election timeout. Increments the term
    /// (new election) and re-arms the election timer.
    pub(crate) fn become_candidate(&mut self) {
        self.term.next();
        self.leader = None;
        self.enter_role(Role::Candidate);
    }

    /// Transitions to Follower at term `t`, provided `t >= current_term`.
    /// A no-op term-wise if `t` is stale; the role switch (and timer
    /// rearm) still happens unconditionally when `t >= current_term`, per
    /// `Any -> Follower: becomeFollower(t) called with t >= currentTerm`.
    /// Idempotent: calling this repeatedly while already Follower at the
    /// same term emits no further event, but still re-arms the timer.
    pub(crate) fn become_follower(&mut self, t: Term) {
        if t < self.term.current() {
            return;
        }
        self.term.update_to(t);
        self.enter_role(Role::Follower);
    }

    /// Candidate -> Leader once a majority of votes has been collected.
    pub(crate) fn become_leader(&mut self) {
        self.leader = Some(self.id.clone());
        self.enter_role(Role::Leader);
    }

    /// Handles an inbound heartbeat from `peer` carrying `peer_term`.
    pub(crate) fn heartbeat(&mut self, peer: NodeId, peer_term: Term) {
        let current = self.term.current();
        if peer_term > current {
            self.term.update_to(peer_term);
            self.leader = Some(peer);
            self.enter_role(Role::Follower);
        } else if peer_term == current {
            self.leader = Some(peer);
            if self.role == Role::Candidate {
                self.enter_role(Role::Follower);
            } else if self.role == Role::Follower {
                self.rearm_election_timer();
                self.publish_snapshot();
            }
            // Leader receiving an equal-term heartbeat from someone else
            // would be a split-brain symptom; left as-is per the source
            // (no special handling specified for that case).
        }
        // peer_term < current: stale, ignored.
    }

    /// Evaluates and applies the vote-granting predicate for an inbound
    /// `VoteRequest(req_term)`, returning whether the vote is granted. A
    /// `req_term` strictly greater than our own steps us down to Follower
    /// first, from any role (Leader included) -- mirroring how `heartbeat`
    /// treats a higher-term message -- so a stale Leader or Candidate
    /// doesn't keep denying every vote from the peer trying to replace it.
    /// `granted` is then `(req_term > current_term) && (role == Follower)`,
    /// using strict `>` rather than `>=` -- preserved verbatim from the
    /// source, see the design notes on the double-voting tradeoff this
    /// implies.
    pub(crate) fn handle_vote_request(&mut self, req_term: Term) -> bool {
        let current = self.term.current();
        if req_term > current {
            self.become_follower(req_term);
        }
        req_term > current && self.role == Role::Follower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sm() -> (
        ElectionStateMachine,
        mpsc::UnboundedReceiver<RoleTransition>,
        watch::Receiver<RoleSnapshot>,
    ) {
        let (events_tx, _events_rx) = tokio::sync::broadcast::channel(16);
        ElectionStateMachine::new(
            "n1".to_string(),
            0,
            ElectionConfig::default(),
            events_tx,
        )
    }

    #[test]
    fn starts_as_follower_at_initial_term() {
        let (sm, _t, _s) = make_sm();
        assert_eq!(sm.role(), Role::Follower);
        assert_eq!(sm.term(), 0);
        assert!(sm.election_timer().is_armed());
        assert!(!sm.heartbeat_timer().is_armed());
    }

    #[test]
    fn become_candidate_bumps_term_and_emits_transition() {
        let (mut sm, mut transitions, _s) = make_sm();
        sm.become_candidate();
        assert_eq!(sm.role(), Role::Candidate);
        assert_eq!(sm.term(), 1);
        assert_eq!(
            transitions.try_recv().unwrap(),
            RoleTransition::EnteredCandidate
        );
    }

    #[test]
    fn become_leader_stops_election_timer_starts_heartbeat() {
        let (mut sm, mut transitions, _s) = make_sm();
        sm.become_candidate();
        transitions.try_recv().unwrap();
        sm.become_leader();
        assert_eq!(sm.role(), Role::Leader);
        assert!(!sm.election_timer().is_armed());
        assert!(sm.heartbeat_timer().is_armed());
        assert_eq!(
            transitions.try_recv().unwrap(),
            RoleTransition::EnteredLeader
        );
        assert_eq!(sm.leader_view().known_leader, Some("n1".to_string()));
    }

    #[test]
    fn become_follower_idempotent_at_same_term() {
        let (mut sm, mut transitions, _s) = make_sm();
        sm.become_candidate();
        transitions.try_recv().unwrap();
        sm.become_follower(1);
        assert_eq!(
            transitions.try_recv().unwrap(),
            RoleTransition::EnteredFollower
        );
        // already follower at term 1; second call emits nothing further
        sm.become_follower(1);
        assert!(transitions.try_recv().is_err());
        assert_eq!(sm.role(), Role::Follower);
    }

    #[test]
    fn become_follower_ignores_stale_term() {
        let (mut sm, _t, _s) = make_sm();
        sm.become_candidate(); // term = 1
        sm.become_follower(0); // stale, ignored
        assert_eq!(sm.term(), 1);
    }

    #[test]
    fn heartbeat_with_higher_term_steps_down_and_sets_leader() {
        let (mut sm, mut transitions, _s) = make_sm();
        sm.become_candidate();
        transitions.try_recv().unwrap();
        sm.heartbeat("leader1".to_string(), 5);
        assert_eq!(sm.role(), Role::Follower);
        assert_eq!(sm.term(), 5);
        assert_eq!(sm.leader_view().known_leader, Some("leader1".to_string()));
    }

    #[test]
    fn heartbeat_with_lower_term_is_ignored() {
        let (mut sm, _t, _s) = make_sm();
        sm.become_candidate(); // term 1
        sm.heartbeat("stale".to_string(), 0);
        assert_eq!(sm.term(), 1);
        assert_eq!(sm.role(), Role::Candidate);
        assert_eq!(sm.leader_view().known_leader, None);
    }

    #[test]
    fn heartbeat_with_equal_term_converts_candidate_to_follower() {
        let (mut sm, mut transitions, _s) = make_sm();
        sm.become_candidate(); // term 1
        transitions.try_recv().unwrap();
        sm.heartbeat("other".to_string(), 1);
        assert_eq!(sm.role(), Role::Follower);
        assert_eq!(sm.term(), 1);
        assert_eq!(
            transitions.try_recv().unwrap(),
            RoleTransition::EnteredFollower
        );
    }

    #[test]
    fn vote_request_granted_only_for_follower_with_strictly_higher_term() {
        let (mut sm, _t, _s) = make_sm();
        assert!(sm.handle_vote_request(1)); // follower, term 0 < 1
        // a granted higher-term vote does fold the new term in, same as
        // a heartbeat would (open question #1 only concerns not granting
        // *beyond* what the request itself carries)
        assert_eq!(sm.term(), 1);
    }

    #[test]
    fn vote_request_denied_at_equal_or_lower_term() {
        let (mut sm, _t, _s) = make_sm();
        sm.become_follower(5);
        assert!(!sm.handle_vote_request(5));
        assert!(!sm.handle_vote_request(4));
    }

    #[test]
    fn vote_request_steps_candidate_down_and_grants_at_higher_term() {
        let (mut sm, mut transitions, _s) = make_sm();
        sm.become_candidate(); // term 1
        transitions.try_recv().unwrap();
        assert!(sm.handle_vote_request(2));
        assert_eq!(sm.role(), Role::Follower);
        assert_eq!(sm.term(), 2);
        // a subsequent request at a still-higher term is granted normally
        assert!(sm.handle_vote_request(3));
    }

    #[test]
    fn leader_steps_down_and_grants_vote_at_higher_term() {
        let (mut sm, mut transitions, _s) = make_sm();
        sm.become_candidate();
        transitions.try_recv().unwrap();
        sm.become_leader();
        transitions.try_recv().unwrap();
        assert!(sm.handle_vote_request(99));
        assert_eq!(sm.role(), Role::Follower);
        assert_eq!(sm.term(), 99);
        assert_eq!(
            transitions.try_recv().unwrap(),
            RoleTransition::EnteredFollower
        );
    }
}
