//! Per-group Raft-style leader election core atop a gossip cluster
//! membership layer.
//!
//! A single [`ElectionDriver`] runs the election protocol for one
//! (node, topic) pair: it discovers peers registered under that topic via
//! [`ClusterHandle`], times out follower periods, runs candidate vote
//! rounds, and heartbeats as leader. External state (log replication,
//! snapshotting, client command execution) is out of scope -- this crate
//! answers exactly one question, "who leads this group right now."

mod utils;

mod term;
mod role;
mod codec;
mod cluster;
mod discovery;
mod statemachine;
mod driver;

pub use cluster::{
    Address, ClusterHandle, Member, Message, NodeId, SimCluster, SimNetwork,
};
pub use driver::{ElectionDriver, ElectionHandle};
pub use role::{ElectionEvent, LeaderView, Role};
pub use statemachine::ElectionConfig;
pub use term::Term;
pub use utils::{logger_init, ElectionError};
