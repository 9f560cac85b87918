//! Frame-tree events
//!
//! Decodes the CDP notifications that can move the current frame into
//! typed records the state machine consumes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cdp::types::{DOMChildNodeInsertedEvent, DOMChildNodeRemovedEvent};
use crate::cdp::CdpMessage;

/// Remote DOM node identity (CDP `DOM.NodeId`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for NodeId {
    fn from(id: i32) -> Self {
        NodeId(id)
    }
}

/// An `<iframe>` (with its content document) was inserted under `parent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildIframeInserted {
    pub node: NodeId,
    pub parent: NodeId,
    pub content_document: NodeId,
    /// CDP frame id of the new browsing context, when Chrome reports it
    pub frame_id: Option<String>,
}

/// A single DOM mutation relevant to frame tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    ChildNodeRemoved { node: NodeId, parent: NodeId },
    ChildIframeInserted(ChildIframeInserted),
}

impl MutationEvent {
    /// Shorthand for a removal
    pub fn removed(node: impl Into<NodeId>, parent: impl Into<NodeId>) -> Self {
        MutationEvent::ChildNodeRemoved {
            node: node.into(),
            parent: parent.into(),
        }
    }

    /// Shorthand for an iframe insertion without a frame id
    pub fn iframe_inserted(
        node: impl Into<NodeId>,
        parent: impl Into<NodeId>,
        content_document: impl Into<NodeId>,
    ) -> Self {
        MutationEvent::ChildIframeInserted(ChildIframeInserted {
            node: node.into(),
            parent: parent.into(),
            content_document: content_document.into(),
            frame_id: None,
        })
    }
}

/// Everything the frame context reacts to
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// DOM mutation
    Mutation(MutationEvent),
    /// `Page.loadEventFired`: everything held so far is invalid
    PageLoaded,
    /// `Page.frameDetached`: some frame went away; payload passed through as-is
    FrameDied(Value),
}

impl FrameEvent {
    /// Decode a CDP message. Returns `None` for anything frame tracking ignores.
    pub fn from_message(message: &CdpMessage) -> Option<Self> {
        let CdpMessage { method, params, .. } = message;

        match method.as_str() {
            "DOM.childNodeRemoved" => {
                match serde_json::from_value::<DOMChildNodeRemovedEvent>(params.clone()) {
                    Ok(e) => Some(FrameEvent::Mutation(MutationEvent::removed(
                        e.node_id,
                        e.parent_node_id,
                    ))),
                    Err(e) => {
                        tracing::warn!("Malformed {} params: {}", method, e);
                        None
                    }
                }
            }
            "DOM.childNodeInserted" => {
                let e = match serde_json::from_value::<DOMChildNodeInsertedEvent>(params.clone()) {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!("Malformed {} params: {}", method, e);
                        return None;
                    }
                };
                if !e.node.is_frame_owner() {
                    return None;
                }
                let Some(document) = e.node.content_document.as_ref() else {
                    tracing::trace!("Frame {} inserted without content document", e.node.node_id);
                    return None;
                };
                Some(FrameEvent::Mutation(MutationEvent::ChildIframeInserted(
                    ChildIframeInserted {
                        node: NodeId(e.node.node_id),
                        parent: NodeId(e.parent_node_id),
                        content_document: NodeId(document.node_id),
                        frame_id: e.node.frame_id.clone(),
                    },
                )))
            }
            "Page.loadEventFired" => Some(FrameEvent::PageLoaded),
            "Page.frameDetached" => Some(FrameEvent::FrameDied(params.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_removed() {
        let msg = CdpMessage::event(
            "DOM.childNodeRemoved",
            json!({ "parentNodeId": 3, "nodeId": 8 }),
        );
        match FrameEvent::from_message(&msg) {
            Some(FrameEvent::Mutation(m)) => assert_eq!(m, MutationEvent::removed(8, 3)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_iframe_insert() {
        let msg = CdpMessage::event(
            "DOM.childNodeInserted",
            json!({
                "parentNodeId": 3,
                "previousNodeId": 2,
                "node": {
                    "nodeId": 10,
                    "nodeName": "iframe",
                    "frameId": "ABC",
                    "contentDocument": { "nodeId": 11, "nodeName": "#document" }
                }
            }),
        );
        match FrameEvent::from_message(&msg) {
            Some(FrameEvent::Mutation(MutationEvent::ChildIframeInserted(e))) => {
                assert_eq!(e.node, NodeId(10));
                assert_eq!(e.parent, NodeId(3));
                assert_eq!(e.content_document, NodeId(11));
                assert_eq!(e.frame_id.as_deref(), Some("ABC"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ignores_plain_elements_and_bare_iframes() {
        let div = CdpMessage::event(
            "DOM.childNodeInserted",
            json!({ "parentNodeId": 1, "node": { "nodeId": 2, "nodeName": "DIV" } }),
        );
        assert!(FrameEvent::from_message(&div).is_none());

        let bare = CdpMessage::event(
            "DOM.childNodeInserted",
            json!({ "parentNodeId": 1, "node": { "nodeId": 2, "nodeName": "IFRAME" } }),
        );
        assert!(FrameEvent::from_message(&bare).is_none());
    }

    #[test]
    fn test_decode_page_signals() {
        let load = CdpMessage::event("Page.loadEventFired", json!({ "timestamp": 1.0 }));
        assert!(matches!(
            FrameEvent::from_message(&load),
            Some(FrameEvent::PageLoaded)
        ));

        let detached = CdpMessage::event("Page.frameDetached", json!({ "frameId": "F9" }));
        match FrameEvent::from_message(&detached) {
            Some(FrameEvent::FrameDied(payload)) => assert_eq!(payload["frameId"], "F9"),
            other => panic!("unexpected {:?}", other),
        }

        let unrelated = CdpMessage::event("Network.requestWillBeSent", json!({}));
        assert!(FrameEvent::from_message(&unrelated).is_none());
    }
}
