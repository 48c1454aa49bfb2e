//! Crate-wide error type.

use std::fmt;

/// Errors surfaced by this crate. A single flat enum rather than pulling
/// in an error-derive crate -- the variant set is small and stable.
#[derive(Debug)]
pub enum ElectionError {
    /// A single outbound RPC (vote or heartbeat) timed out or the
    /// transport reported a failure. Never propagated past the driver's
    /// internal plumbing -- see `TransientRpcFailure` in the design.
    RpcFailure(String),

    /// The cluster collaborator (gossip/transport layer) could not be
    /// reached at `start()` time.
    ClusterUnavailable(String),

    /// Malformed or unparseable configuration string.
    ConfigError(String),

    /// Catch-all for invariant violations and internal plumbing errors
    /// that `logged_err!` constructs inline.
    Internal(String),
}

impl fmt::Display for ElectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RpcFailure(msg) => write!(f, "RPC failure: {}", msg),
            Self::ClusterUnavailable(msg) => {
                write!(f, "cluster unavailable: {}", msg)
            }
            Self::ConfigError(msg) => write!(f, "config error: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ElectionError {}

impl From<toml::de::Error> for ElectionError {
    fn from(e: toml::de::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ElectionError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::RpcFailure(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ElectionError {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::Internal(format!("send on closed channel: {}", e))
    }
}

impl From<bincode::Error> for ElectionError {
    fn from(e: bincode::Error) -> Self {
        Self::Internal(format!("(de)serialization error: {}", e))
    }
}
