//! Election protocol driver: glues the state machine to the cluster.
//!
//! `ElectionDriver` is a builder; `start()` spawns a single actor task
//! that exclusively owns the `ElectionStateMachine` for the lifetime of
//! the (node, topic) pair, per the single-writer-actor concurrency model.
//! Callers interact with the running driver only through the returned
//! `ElectionHandle`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::cluster::{ClusterHandle, Message, NodeId};
use crate::codec::{
    self, HeartbeatRequest, HeartbeatResponse, Payload, VoteRequest,
    VoteResponse,
};
use crate::discovery::{PeerDiscovery, TOPIC_MEMBER_MARKER};
use crate::role::{ElectionEvent, LeaderView, Role, RoleTransition};
use crate::statemachine::{ElectionConfig, ElectionStateMachine, RoleSnapshot};
use crate::term::Term;
use crate::utils::{print, ElectionError};

/// Commands fed back into the actor loop by a spawned vote-round task.
/// Both carry the term the round was run for, so the actor can discard a
/// stale result if the role/term has since moved on.
enum ActorCmd {
    VoteRoundSucceeded(Term),
    VoteRoundFailed(Term),
}

/// Builder for one (node, topic) election driver. Configure, then
/// `start()` to spawn the actor and obtain a live `ElectionHandle`.
pub struct ElectionDriver {
    id: NodeId,
    topic: String,
    cluster: Arc<dyn ClusterHandle>,
    config: ElectionConfig,
}

impl ElectionDriver {
    pub fn new(
        id: impl Into<NodeId>,
        topic: impl Into<String>,
        cluster: Arc<dyn ClusterHandle>,
        config: ElectionConfig,
    ) -> Self {
        ElectionDriver { id: id.into(), topic: topic.into(), cluster, config }
    }

    /// Builds a driver with config loaded from an optional TOML string,
    /// merged onto `ElectionConfig::default()` field by field.
    pub fn with_config_str(
        id: impl Into<NodeId>,
        topic: impl Into<String>,
        cluster: Arc<dyn ClusterHandle>,
        config_str: Option<&str>,
    ) -> Result<Self, ElectionError> {
        let config: ElectionConfig = parsed_config!(config_str, ElectionConfig)?;
        Ok(Self::new(id, topic, cluster, config))
    }

    /// Publishes group membership, subscribes to inbound messages, enters
    /// Follower, and spawns the actor loop. Returns once the actor is
    /// ready to process events.
    pub async fn start(self) -> Result<ElectionHandle, ElectionError> {
        print::set_me(format!("{}@{}", self.id, self.topic));

        self.cluster
            .update_metadata_property(
                self.topic.clone(),
                TOPIC_MEMBER_MARKER.to_string(),
            )
            .await?;
        let inbound_rx = self.cluster.listen().await?;

        let (events_tx, _unused_rx) = broadcast::channel(64);
        let (sm, transition_rx, snapshot_rx) = ElectionStateMachine::new(
            self.id.clone(),
            0,
            self.config,
            events_tx.clone(),
        );
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let discovery =
            PeerDiscovery::new(self.cluster.clone(), self.topic.clone());

        let actor = Actor {
            id: self.id,
            topic: self.topic,
            cluster: self.cluster,
            discovery,
            sm,
            transition_rx,
            inbound_rx,
            inbound_closed: false,
            cmd_tx,
            cmd_rx,
            shutdown_rx,
            vote_round: None,
        };
        let join = tokio::spawn(actor.run());

        pf_info!("election driver started");
        Ok(ElectionHandle { snapshot_rx, events_tx, shutdown_tx, join })
    }
}

/// A live election driver. Cheap to query; `listen()` can be called any
/// number of times to add subscribers.
pub struct ElectionHandle {
    snapshot_rx: watch::Receiver<RoleSnapshot>,
    events_tx: broadcast::Sender<ElectionEvent>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    join: JoinHandle<()>,
}

impl ElectionHandle {
    pub fn current_role(&self) -> Role {
        self.snapshot_rx.borrow().role
    }

    pub fn current_term(&self) -> Term {
        self.snapshot_rx.borrow().term
    }

    pub fn leader_view(&self) -> LeaderView {
        self.snapshot_rx.borrow().leader_view.clone()
    }

    /// Subscribes to role-change events from this point forward. A
    /// lagging subscriber observes `RecvError::Lagged` rather than
    /// blocking the election loop.
    pub fn listen(&self) -> broadcast::Receiver<ElectionEvent> {
        self.events_tx.subscribe()
    }

    /// Stops timers, unsubscribes from inbound messages, and lets any
    /// in-flight RPCs complete or be abandoned without effect on state.
    pub async fn shutdown(self) -> Result<(), ElectionError> {
        let _ = self.shutdown_tx.send(());
        self.join
            .await
            .map_err(|e| ElectionError::Internal(e.to_string()))
    }

    /// Aborts the driver task immediately, without the graceful unwind
    /// `shutdown()` performs. Used by tests to simulate a node crashing
    /// outright; embedders doing an orderly stop should use `shutdown()`.
    pub fn abort(&self) {
        self.join.abort();
    }
}

struct Actor {
    id: NodeId,
    topic: String,
    cluster: Arc<dyn ClusterHandle>,
    discovery: PeerDiscovery,
    sm: ElectionStateMachine,
    transition_rx: mpsc::UnboundedReceiver<RoleTransition>,
    inbound_rx: mpsc::UnboundedReceiver<Message>,
    inbound_closed: bool,
    cmd_tx: mpsc::UnboundedSender<ActorCmd>,
    cmd_rx: mpsc::UnboundedReceiver<ActorCmd>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,
    vote_round: Option<JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    pf_info!("shutting down");
                    break;
                }

                msg = self.inbound_rx.recv(), if !self.inbound_closed => {
                    match msg {
                        Some(msg) => self.dispatch_inbound(msg).await,
                        None => {
                            // Cluster transport closed its sender; stop
                            // polling this arm rather than busy-looping
                            // on an endlessly-ready closed channel.
                            self.inbound_closed = true;
                        }
                    }
                }

                Some(transition) = self.transition_rx.recv() => {
                    self.react_to_transition(transition).await;
                }

                Some(cmd) = self.cmd_rx.recv() => {
                    self.handle_cmd(cmd);
                }

                _ = self.sm.election_timer().sleep_until(),
                    if self.sm.role() == Role::Follower =>
                {
                    pf_debug!("election timeout, becoming candidate");
                    self.sm.become_candidate();
                }

                _ = self.sm.heartbeat_timer().sleep_until(),
                    if self.sm.role() == Role::Leader =>
                {
                    self.send_heartbeat_round().await;
                    self.sm.rearm_heartbeat_timer();
                }
            }
        }

        if let Some(h) = self.vote_round.take() {
            h.abort();
        }
    }

    async fn dispatch_inbound(&mut self, msg: Message) {
        if codec::is_vote(&self.topic, &msg.qualifier) {
            let Ok(Payload::VoteRequest(req)) = codec::decode(&msg) else {
                return;
            };
            let granted = self.sm.handle_vote_request(req.term);
            pf_trace!(
                "vote request from term {} -> granted={}",
                req.term,
                granted
            );
            let reply = Payload::VoteResponse(VoteResponse {
                granted,
                member_id: self.id.clone(),
            });
            self.reply(&msg, reply).await;
        } else if codec::is_heartbeat(&self.topic, &msg.qualifier) {
            let Ok(Payload::HeartbeatRequest(req)) = codec::decode(&msg)
            else {
                return;
            };
            self.sm.heartbeat(req.member_id.clone(), req.term);
            let reply = Payload::HeartbeatResponse(HeartbeatResponse {
                member_id: self.id.clone(),
                term: self.sm.term(),
            });
            self.reply(&msg, reply).await;
        }
        // Anything else (including stray responses misdelivered outside
        // a request_response correlation) is ignored.
    }

    async fn reply(&self, original: &Message, payload: Payload) {
        let Ok(reply) = codec::encode(
            original.qualifier.clone(),
            self.cluster.local_address(),
            original.correlation_id,
            &payload,
        ) else {
            return;
        };
        let _ = self.cluster.send(&original.sender, reply).await;
    }

    async fn react_to_transition(&mut self, transition: RoleTransition) {
        match transition {
            RoleTransition::EnteredCandidate => {
                if let Some(h) = self.vote_round.take() {
                    h.abort();
                }
                self.vote_round = Some(self.spawn_vote_round());
            }
            RoleTransition::EnteredFollower => {
                if let Some(h) = self.vote_round.take() {
                    h.abort();
                }
            }
            RoleTransition::EnteredLeader => {
                if let Some(h) = self.vote_round.take() {
                    h.abort();
                }
                // Assert leadership immediately rather than waiting out
                // the first full heartbeat period.
                self.send_heartbeat_round().await;
                self.sm.rearm_heartbeat_timer();
            }
        }
    }

    fn handle_cmd(&mut self, cmd: ActorCmd) {
        match cmd {
            ActorCmd::VoteRoundSucceeded(t) => {
                if self.sm.role() == Role::Candidate && self.sm.term() == t {
                    self.sm.become_leader();
                }
            }
            ActorCmd::VoteRoundFailed(t) => {
                if self.sm.role() == Role::Candidate && self.sm.term() == t {
                    self.sm.become_follower(t);
                }
            }
        }
    }

    /// Snapshots the peer set and runs one candidate vote round as an
    /// independent task, reporting its outcome back via `cmd_tx`. The
    /// returned handle is aborted by the actor on any transition out of
    /// Candidate, per the cancellation rule in the design.
    fn spawn_vote_round(&self) -> JoinHandle<()> {
        let term = self.sm.term();
        let peers = self.discovery.find_peers();
        let cluster = self.cluster.clone();
        let topic = self.topic.clone();
        let vote_timeout =
            Duration::from_millis(self.sm.config().vote_timeout_ms);
        let cmd_tx = self.cmd_tx.clone();

        tokio::spawn(async move {
            if peers.is_empty() {
                // Trivial majority of one: no peers to ask.
                let _ = cmd_tx.send(ActorCmd::VoteRoundSucceeded(term));
                return;
            }

            let needed = (1 + peers.len()) / 2;
            let sender_addr = cluster.local_address();
            let responses = futures::future::join_all(peers.into_iter().map(
                |peer| {
                    let cluster = cluster.clone();
                    let topic = topic.clone();
                    let sender_addr = sender_addr.clone();
                    async move {
                        let payload =
                            Payload::VoteRequest(VoteRequest { term });
                        let msg = codec::encode(
                            codec::vote_qualifier(&topic),
                            sender_addr,
                            0,
                            &payload,
                        )
                        .ok()?;
                        let reply = cluster
                            .request_response(
                                &peer.address,
                                msg,
                                vote_timeout,
                            )
                            .await
                            .ok()?;
                        match codec::decode(&reply) {
                            Ok(Payload::VoteResponse(resp)) => Some(resp),
                            _ => None,
                        }
                    }
                },
            ));

            let responses = match tokio::time::timeout(vote_timeout, responses)
                .await
            {
                Ok(r) => r,
                Err(_) => vec![], // overall round deadline elapsed
            };
            let yes_count =
                responses.iter().flatten().filter(|r| r.granted).count();

            if yes_count >= needed {
                let _ = cmd_tx.send(ActorCmd::VoteRoundSucceeded(term));
            } else {
                let _ = cmd_tx.send(ActorCmd::VoteRoundFailed(term));
            }
        })
    }

    /// Broadcasts a heartbeat to every peer with a per-RPC deadline equal
    /// to the election timeout. Non-responding peers are tolerated
    /// silently; a reply's term is folded into the shared term register
    /// without itself stepping the leader down (see DESIGN.md).
    async fn send_heartbeat_round(&mut self) {
        let peers = self.discovery.find_peers();
        let term = self.sm.term();
        let id = self.id.clone();
        let topic = self.topic.clone();
        let cluster = self.cluster.clone();
        let term_register = self.sm.term_register();
        let deadline =
            Duration::from_millis(self.sm.config().election_timeout_ms);
        let sender_addr = cluster.local_address();

        for peer in peers {
            let cluster = cluster.clone();
            let topic = topic.clone();
            let id = id.clone();
            let term_register = term_register.clone();
            let sender_addr = sender_addr.clone();
            tokio::spawn(async move {
                let payload = Payload::HeartbeatRequest(HeartbeatRequest {
                    term,
                    member_id: id,
                });
                let Ok(msg) = codec::encode(
                    codec::heartbeat_qualifier(&topic),
                    sender_addr,
                    0,
                    &payload,
                ) else {
                    return;
                };
                if let Ok(reply) = cluster
                    .request_response(&peer.address, msg, deadline)
                    .await
                {
                    if let Ok(Payload::HeartbeatResponse(resp)) =
                        codec::decode(&reply)
                    {
                        term_register.update_to(resp.term);
                    }
                }
            });
        }
    }
}
