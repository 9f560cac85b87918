//! Error types for eoka-frames

use std::time::Duration;

use thiserror::Error;

use crate::event::NodeId;

/// Result type for eoka-frames operations
pub type Result<T> = std::result::Result<T, Error>;

/// CDP error code Chrome returns when a node id no longer resolves
pub(crate) const CDP_SERVER_ERROR: i64 = -32000;

/// Error type for eoka-frames
#[derive(Debug, Error)]
pub enum Error {
    /// A bounded wait ran out
    #[error("Timeout: {what} after {}ms", .elapsed.as_millis())]
    Timeout { what: String, elapsed: Duration },

    /// More than one replacement frame claims the awaited parent
    #[error("Protocol anomaly: {candidates} replacement frames found under parent {parent}")]
    ProtocolAnomaly { parent: NodeId, candidates: usize },

    /// CDP protocol error
    #[error("CDP error in {method}: {message} (code {code})")]
    Cdp {
        method: String,
        code: i64,
        message: String,
    },

    /// CDP error without method context (for simple cases)
    #[error("CDP error: {0}")]
    CdpSimple(String),

    /// Node could not be turned into a live handle
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The command channel or event stream went away
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl Error {
    /// Create a CDP error with full context
    pub fn cdp(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Cdp {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            elapsed,
        }
    }

    /// Check if this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Check if the remote side reported that a node is gone
    pub fn is_missing_node(&self) -> bool {
        match self {
            Error::NodeNotFound(_) => true,
            Error::Cdp { code, message, .. } => {
                *code == CDP_SERVER_ERROR
                    && (message.contains("Could not find node")
                        || message.contains("No node with given id"))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("document not ready", Duration::from_millis(5000));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timeout: document not ready after 5000ms");
    }

    #[test]
    fn test_missing_node_detection() {
        let gone = Error::cdp("DOM.describeNode", -32000, "Could not find node with given id");
        assert!(gone.is_missing_node());

        let other = Error::cdp("DOM.describeNode", -32602, "Invalid parameters");
        assert!(!other.is_missing_node());

        assert!(Error::NodeNotFound(NodeId(7)).is_missing_node());
    }
}
