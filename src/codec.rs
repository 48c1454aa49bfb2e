//! Protocol codec: topic-scoped message qualifiers and typed payloads for
//! the vote and heartbeat RPCs.

use serde::{Deserialize, Serialize};

use crate::cluster::{Address, Message, NodeId};
use crate::term::Term;
use crate::utils::ElectionError;

/// Suffix identifying vote-round messages, appended to the topic to form
/// the wire qualifier `"<topic>/vote"`.
const VOTE_SUFFIX: &str = "vote";
/// Suffix identifying heartbeat messages, `"<topic>/heartbeat"`.
const HEARTBEAT_SUFFIX: &str = "heartbeat";

pub fn vote_qualifier(topic: &str) -> String {
    format!("{}/{}", topic, VOTE_SUFFIX)
}

pub fn heartbeat_qualifier(topic: &str) -> String {
    format!("{}/{}", topic, HEARTBEAT_SUFFIX)
}

pub fn is_vote(topic: &str, qualifier: &str) -> bool {
    qualifier == vote_qualifier(topic)
}

pub fn is_heartbeat(topic: &str, qualifier: &str) -> bool {
    qualifier == heartbeat_qualifier(topic)
}

/// Sent by a candidate to request a peer's vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: Term,
}

/// A peer's answer to a `VoteRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub granted: bool,
    pub member_id: NodeId,
}

/// Sent by a leader to assert liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub term: Term,
    pub member_id: NodeId,
}

/// A peer's echo of its own current term in response to a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub member_id: NodeId,
    pub term: Term,
}

/// The union of typed payloads this module ever serializes onto the wire.
/// `Message::payload` is always the `bincode` encoding of one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    HeartbeatRequest(HeartbeatRequest),
    HeartbeatResponse(HeartbeatResponse),
}

/// Wraps a typed payload into a transport `Message` tagged with the given
/// qualifier, sender address, and correlation id.
pub fn encode(
    qualifier: String,
    sender: Address,
    correlation_id: u64,
    payload: &Payload,
) -> Result<Message, ElectionError> {
    let bytes = bincode::serialize(payload)?;
    Ok(Message { qualifier, sender, correlation_id, payload: bytes })
}

/// Recovers the typed payload from a transport `Message`.
pub fn decode(msg: &Message) -> Result<Payload, ElectionError> {
    Ok(bincode::deserialize(&msg.payload)?)
}
