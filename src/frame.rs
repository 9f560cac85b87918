//! Frame handles
//!
//! A frame is addressed through three remote references: the `<iframe>`
//! element, its content document and its content window. The main frame has
//! no iframe element.

use async_trait::async_trait;

use crate::error::Result;
use crate::event::NodeId;

/// Live handle to a remote DOM node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub node_id: NodeId,
    /// Runtime object id, when the node has been resolved
    pub object_id: Option<String>,
    /// CDP frame id, set for iframe elements when known
    pub frame_id: Option<String>,
}

impl RemoteNode {
    /// Handle with only a node id
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            object_id: None,
            frame_id: None,
        }
    }
}

/// Remote reference to a `Window` object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWindow {
    pub object_id: String,
}

impl RemoteWindow {
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
        }
    }
}

/// The (iframe, document, window) triple a driver command runs against.
///
/// Never edited in place: every transition builds a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameHandle {
    iframe: Option<RemoteNode>,
    document: Option<RemoteNode>,
    window: Option<RemoteWindow>,
}

impl FrameHandle {
    pub fn new(
        iframe: Option<RemoteNode>,
        document: Option<RemoteNode>,
        window: Option<RemoteWindow>,
    ) -> Self {
        Self {
            iframe,
            document,
            window,
        }
    }

    /// Top-level document (no iframe element)
    pub fn main(document: RemoteNode, window: RemoteWindow) -> Self {
        Self::new(None, Some(document), Some(window))
    }

    /// Frame entered through an `<iframe>` element
    pub fn child(iframe: RemoteNode, document: RemoteNode, window: RemoteWindow) -> Self {
        Self::new(Some(iframe), Some(document), Some(window))
    }

    pub fn iframe(&self) -> Option<&RemoteNode> {
        self.iframe.as_ref()
    }

    pub fn document(&self) -> Option<&RemoteNode> {
        self.document.as_ref()
    }

    pub fn window(&self) -> Option<&RemoteWindow> {
        self.window.as_ref()
    }

    /// All three references are empty
    pub fn is_empty(&self) -> bool {
        self.iframe.is_none() && self.document.is_none() && self.window.is_none()
    }
}

/// Turns protocol node ids into live handles.
///
/// Every call may be a round trip to the browser and may fail.
#[async_trait]
pub trait NodeResolver: Send + Sync {
    /// Build a live handle for `node_id`
    async fn node(&self, node_id: NodeId) -> Result<RemoteNode>;

    /// Resolve the content window of an `<iframe>` element
    async fn content_window(&self, iframe: &RemoteNode) -> Result<RemoteWindow>;

    /// Whether the node still exists in the remote document
    async fn exists(&self, node: &RemoteNode) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_handle_has_no_iframe() {
        let handle = FrameHandle::main(RemoteNode::new(1), RemoteWindow::new("w"));
        assert!(handle.iframe().is_none());
        assert_eq!(handle.document().map(|d| d.node_id), Some(NodeId(1)));
        assert!(!handle.is_empty());
        assert!(FrameHandle::default().is_empty());
    }
}
