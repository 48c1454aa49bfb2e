//! Peer discovery adapter: filters gossiped cluster membership down to
//! the nodes participating in one election topic.

use std::sync::Arc;

use crate::cluster::{ClusterHandle, Member};

/// The metadata value marking a member as part of an election group. The
/// metadata *key* is the topic name itself -- not a fixed constant --
/// since a single node's metadata map is shared across every election
/// topic it participates in; keying by topic lets one node run more than
/// one `ElectionDriver` (one per topic) over the same `ClusterHandle`
/// without their group-membership entries clobbering each other.
pub const TOPIC_MEMBER_MARKER: &str = "leader-election";

/// Wraps a `ClusterHandle` and a topic name, exposing the single
/// `find_peers()` operation the driver needs.
pub(crate) struct PeerDiscovery {
    cluster: Arc<dyn ClusterHandle>,
    topic: String,
}

impl PeerDiscovery {
    pub(crate) fn new(cluster: Arc<dyn ClusterHandle>, topic: String) -> Self {
        PeerDiscovery { cluster, topic }
    }

    /// Returns every other cluster member whose gossiped metadata
    /// registers it in this election topic. Recomputed on every call --
    /// no caching, so callers must tolerate churn between successive
    /// calls within a single election round.
    pub(crate) fn find_peers(&self) -> Vec<Member> {
        self.cluster
            .other_members()
            .into_iter()
            .filter(|m| {
                self.cluster
                    .metadata(m)
                    .get(&self.topic)
                    .is_some_and(|v| v == TOPIC_MEMBER_MARKER)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::SimNetwork;

    #[tokio::test]
    async fn filters_by_topic_metadata() {
        let net = SimNetwork::new();
        let a = net.spawn_node("a");
        let b = net.spawn_node("b");
        let c = net.spawn_node("c");

        b.update_metadata_property(
            "elect-leader".into(),
            TOPIC_MEMBER_MARKER.into(),
        )
        .await
        .unwrap();
        c.update_metadata_property("other-topic".into(), TOPIC_MEMBER_MARKER.into())
            .await
            .unwrap();

        let discovery = PeerDiscovery::new(Arc::new(a), "elect-leader".into());
        let peers = discovery.find_peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, "b");
    }

    #[tokio::test]
    async fn empty_peer_set_when_nobody_registered() {
        let net = SimNetwork::new();
        let a = net.spawn_node("a");
        let _b = net.spawn_node("b");
        let discovery = PeerDiscovery::new(Arc::new(a), "elect-leader".into());
        assert!(discovery.find_peers().is_empty());
    }

    #[tokio::test]
    async fn one_node_can_join_two_topics_without_clobbering() {
        let net = SimNetwork::new();
        let a = net.spawn_node("a");
        let b = net.spawn_node("b");
        b.update_metadata_property("topic-a".into(), TOPIC_MEMBER_MARKER.into())
            .await
            .unwrap();
        b.update_metadata_property("topic-b".into(), TOPIC_MEMBER_MARKER.into())
            .await
            .unwrap();

        let a_shared = Arc::new(a);
        let discovery_a = PeerDiscovery::new(a_shared.clone(), "topic-a".into());
        let discovery_b = PeerDiscovery::new(a_shared, "topic-b".into());
        assert_eq!(discovery_a.find_peers().len(), 1);
        assert_eq!(discovery_b.find_peers().len(), 1);
    }
}
