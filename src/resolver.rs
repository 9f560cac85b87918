//! CDP-backed node resolver

use async_trait::async_trait;

use crate::cdp::Session;
use crate::error::{Error, Result};
use crate::event::NodeId;
use crate::frame::{NodeResolver, RemoteNode, RemoteWindow};

const CONTENT_WINDOW_FN: &str = "function() { return this.contentWindow; }";

/// [`NodeResolver`] speaking CDP through a page session
#[derive(Debug, Clone)]
pub struct CdpResolver {
    session: Session,
}

impl CdpResolver {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Get the underlying CDP session
    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[async_trait]
impl NodeResolver for CdpResolver {
    async fn node(&self, node_id: NodeId) -> Result<RemoteNode> {
        let object_id = self.session.resolve_node(node_id.0).await.map_err(|e| {
            if e.is_missing_node() {
                Error::NodeNotFound(node_id)
            } else {
                e
            }
        })?;
        Ok(RemoteNode {
            node_id,
            object_id: Some(object_id),
            frame_id: None,
        })
    }

    async fn content_window(&self, iframe: &RemoteNode) -> Result<RemoteWindow> {
        let object_id = match &iframe.object_id {
            Some(id) => id.clone(),
            None => self.session.resolve_node(iframe.node_id.0).await?,
        };
        let window = self
            .session
            .call_function_for_object(&object_id, CONTENT_WINDOW_FN)
            .await?;
        Ok(RemoteWindow::new(window))
    }

    async fn exists(&self, node: &RemoteNode) -> Result<bool> {
        match self.session.describe_node(node.node_id.0).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_missing_node() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
