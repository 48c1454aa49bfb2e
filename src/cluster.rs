//! The external-collaborator surface this crate depends on: cluster
//! membership discovery and a correlated message transport. Production
//! embedders implement `ClusterHandle` over their own SWIM-style gossip
//! layer and transport; this module also ships an in-memory `SimCluster`
//! double used by the scenario test suite, following the host library's
//! pattern of one trait per concern implemented once for production and
//! once (per protocol, here per test) for a simulated environment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::utils::ElectionError;

/// Cluster-unique, stable node identifier.
pub type NodeId = String;

/// Opaque transport address; this crate never parses or dials it itself,
/// it only ever hands it back to `ClusterHandle::send`/`request_response`.
pub type Address = String;

/// A remote cluster member as discovered via gossip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    pub id: NodeId,
    pub address: Address,
}

/// A transport message: a topic-scoped qualifier, the sender's address, a
/// correlation id tying a response back to its request, and an opaque
/// serialized payload (see `codec`).
#[derive(Debug, Clone)]
pub struct Message {
    pub qualifier: String,
    pub sender: Address,
    pub correlation_id: u64,
    pub payload: Vec<u8>,
}

/// The capabilities the election driver needs from the surrounding
/// cluster membership/gossip layer. Exactly the set enumerated in the
/// design: identity, discovery, metadata, and two message primitives.
#[async_trait]
pub trait ClusterHandle: Send + Sync {
    fn local_member_id(&self) -> NodeId;

    fn local_address(&self) -> Address;

    /// All other known cluster members, recomputed on every call -- no
    /// caching, callers must tolerate churn between calls.
    fn other_members(&self) -> Vec<Member>;

    /// The gossiped metadata map for the given member.
    fn metadata(&self, member: &Member) -> HashMap<String, String>;

    /// Takes ownership of the inbound message stream. Callable once; a
    /// second call's behavior is implementation-defined (the production
    /// adapter and `SimCluster` both return an already-closed channel).
    async fn listen(&self) -> Result<mpsc::UnboundedReceiver<Message>, ElectionError>;

    /// One-way send; used both for replies (tagged with the original
    /// request's correlation id) and to route a fresh request's bytes to
    /// its destination under the hood of `request_response`.
    async fn send(&self, addr: &Address, msg: Message) -> Result<(), ElectionError>;

    /// Correlated round-trip with an explicit per-call deadline.
    async fn request_response(
        &self,
        addr: &Address,
        msg: Message,
        timeout: Duration,
    ) -> Result<Message, ElectionError>;

    /// Advertises a gossip metadata property for this node, e.g.
    /// `topic -> "leader-election"` so peers discover group membership.
    async fn update_metadata_property(
        &self,
        key: String,
        value: String,
    ) -> Result<(), ElectionError>;
}

struct SimNetworkInner {
    addresses: HashMap<NodeId, Address>,
    metadata: HashMap<NodeId, HashMap<String, String>>,
    inboxes: HashMap<Address, mpsc::UnboundedSender<Message>>,
    address_to_id: HashMap<Address, NodeId>,
    pending: HashMap<(Address, u64), oneshot::Sender<Message>>,
    next_correlation: AtomicU64,
    killed: std::collections::HashSet<NodeId>,
    blocked_pairs: std::collections::HashSet<(NodeId, NodeId)>,
}

fn normalize_pair(a: &NodeId, b: &NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Shared registry backing a set of `SimCluster` node handles in one
/// process. Tests spin one of these up, `spawn_node()` for each simulated
/// node, and use `kill`/`partition`/`heal` to inject faults.
#[derive(Clone)]
pub struct SimNetwork {
    inner: Arc<Mutex<SimNetworkInner>>,
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimNetwork {
    pub fn new() -> Self {
        SimNetwork {
            inner: Arc::new(Mutex::new(SimNetworkInner {
                addresses: HashMap::new(),
                metadata: HashMap::new(),
                inboxes: HashMap::new(),
                address_to_id: HashMap::new(),
                pending: HashMap::new(),
                next_correlation: AtomicU64::new(1),
                killed: std::collections::HashSet::new(),
                blocked_pairs: std::collections::HashSet::new(),
            })),
        }
    }

    /// Registers a new simulated node and returns its `ClusterHandle`.
    /// The node's address is simply its id -- addressing/dialing is
    /// outside this crate's scope, so a simulated transport gains
    /// nothing from distinguishing the two.
    pub fn spawn_node(&self, id: impl Into<NodeId>) -> SimCluster {
        let id = id.into();
        let address: Address = id.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.addresses.insert(id.clone(), address.clone());
            inner.address_to_id.insert(address.clone(), id.clone());
            inner.metadata.entry(id.clone()).or_default();
            inner.inboxes.insert(address.clone(), tx);
        }
        SimCluster {
            network: self.inner.clone(),
            id,
            address,
            inbound_rx: Mutex::new(Some(rx)),
        }
    }

    /// Simulates a node crash: its inbox is torn down and all sends
    /// to/from it are dropped from this point on.
    pub fn kill(&self, id: &NodeId) {
        let mut inner = self.inner.lock().unwrap();
        inner.killed.insert(id.clone());
        if let Some(addr) = inner.addresses.get(id).cloned() {
            inner.inboxes.remove(&addr);
        }
    }

    /// Blocks delivery between every node in `group_a` and every node in
    /// `group_b` (bidirectionally), simulating a network partition.
    /// Nodes within the same group can still reach each other.
    pub fn partition(&self, group_a: &[NodeId], group_b: &[NodeId]) {
        let mut inner = self.inner.lock().unwrap();
        for a in group_a {
            for b in group_b {
                inner.blocked_pairs.insert(normalize_pair(a, b));
            }
        }
    }

    /// Clears all partitions injected via `partition()`. Killed nodes
    /// stay dead -- `heal()` only affects network splits.
    pub fn heal(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.blocked_pairs.clear();
    }
}

/// A single simulated node's view of a `SimNetwork`.
pub struct SimCluster {
    network: Arc<Mutex<SimNetworkInner>>,
    id: NodeId,
    address: Address,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

impl SimCluster {
    fn route(&self, dest: &Address, msg: Message) {
        let mut inner = self.network.lock().unwrap();

        // A reply destined for a pending request_response caller is
        // routed straight to the waiting oneshot rather than re-entering
        // the destination's normal inbound stream.
        if let Some(tx) = inner.pending.remove(&(dest.clone(), msg.correlation_id))
        {
            let _ = tx.send(msg);
            return;
        }

        let dest_id = inner.address_to_id.get(dest).cloned();
        let sender_id = inner.address_to_id.get(&msg.sender).cloned();
        if let (Some(dest_id), Some(sender_id)) = (&dest_id, &sender_id) {
            if inner.killed.contains(dest_id) || inner.killed.contains(sender_id)
            {
                return;
            }
            if inner
                .blocked_pairs
                .contains(&normalize_pair(dest_id, sender_id))
            {
                return;
            }
        }

        if let Some(inbox) = inner.inboxes.get(dest) {
            let _ = inbox.send(msg);
        }
        // Unknown destination: dropped silently, matching best-effort
        // delivery semantics for a peer that has since left the cluster.
    }
}

#[async_trait]
impl ClusterHandle for SimCluster {
    fn local_member_id(&self) -> NodeId {
        self.id.clone()
    }

    fn local_address(&self) -> Address {
        self.address.clone()
    }

    fn other_members(&self) -> Vec<Member> {
        let inner = self.network.lock().unwrap();
        inner
            .addresses
            .iter()
            .filter(|(id, _)| **id != self.id)
            .map(|(id, addr)| Member { id: id.clone(), address: addr.clone() })
            .collect()
    }

    fn metadata(&self, member: &Member) -> HashMap<String, String> {
        let inner = self.network.lock().unwrap();
        inner.metadata.get(&member.id).cloned().unwrap_or_default()
    }

    async fn listen(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<Message>, ElectionError> {
        self.inbound_rx.lock().unwrap().take().ok_or_else(|| {
            ElectionError::Internal("listen() already called".into())
        })
    }

    async fn send(&self, addr: &Address, msg: Message) -> Result<(), ElectionError> {
        self.route(addr, msg);
        Ok(())
    }

    async fn request_response(
        &self,
        addr: &Address,
        mut msg: Message,
        timeout: Duration,
    ) -> Result<Message, ElectionError> {
        let id = {
            let inner = self.network.lock().unwrap();
            inner.next_correlation.fetch_add(1, Ordering::SeqCst)
        };
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.network.lock().unwrap();
            inner.pending.insert((self.address.clone(), id), tx);
        }
        msg.correlation_id = id;
        msg.sender = self.address.clone();
        self.route(addr, msg);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                let mut inner = self.network.lock().unwrap();
                inner.pending.remove(&(self.address.clone(), id));
                Err(ElectionError::RpcFailure(
                    "requester dropped before reply".into(),
                ))
            }
            Err(_) => {
                let mut inner = self.network.lock().unwrap();
                inner.pending.remove(&(self.address.clone(), id));
                Err(ElectionError::RpcFailure("request timed out".into()))
            }
        }
    }

    async fn update_metadata_property(
        &self,
        key: String,
        value: String,
    ) -> Result<(), ElectionError> {
        let mut inner = self.network.lock().unwrap();
        inner.metadata.entry(self.id.clone()).or_default().insert(key, value);
        Ok(())
    }
}
