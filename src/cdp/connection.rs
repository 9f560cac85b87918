//! CDP Session
//!
//! Typed wrapper over whatever carries commands to Chrome. The wire itself
//! (WebSocket framing, process lifecycle) belongs to the embedding driver,
//! which plugs in through [`CommandChannel`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::types::*;
use crate::error::{Error, Result};

/// Object group used for every remote object this crate creates
const OBJECT_GROUP: &str = "eoka-frames";

/// Sends a raw CDP command on a session and returns its `result` object
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn call(&self, session_id: &str, method: &str, params: Value) -> Result<Value>;
}

/// A CDP session attached to a specific target
#[derive(Clone)]
pub struct Session {
    channel: Arc<dyn CommandChannel>,
    session_id: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session on top of a command channel
    pub fn new(channel: Arc<dyn CommandChannel>, session_id: impl Into<String>) -> Self {
        Self {
            channel,
            session_id: session_id.into(),
        }
    }

    /// Get the session ID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a command to this session
    pub async fn send<C, R>(&self, method: &str, params: &C) -> Result<R>
    where
        C: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.channel.call(&self.session_id, method, params).await?;
        tracing::trace!("CDP {} ok (session={})", method, self.session_id);
        Ok(serde_json::from_value(result)?)
    }

    /// Resolve a DOM node to a Runtime remote object ID
    pub async fn resolve_node(&self, node_id: i32) -> Result<String> {
        let result: DOMResolveNodeResult = self
            .send(
                "DOM.resolveNode",
                &DOMResolveNode {
                    node_id: Some(node_id),
                    object_group: Some(OBJECT_GROUP.to_string()),
                },
            )
            .await?;
        result
            .object
            .object_id
            .ok_or_else(|| Error::cdp("DOM.resolveNode", -1, "No object_id returned"))
    }

    /// Describe a node (fails once the node id is gone)
    pub async fn describe_node(&self, node_id: i32) -> Result<DOMNode> {
        let result: DOMDescribeNodeResult = self
            .send(
                "DOM.describeNode",
                &DOMDescribeNode {
                    node_id: Some(node_id),
                    depth: Some(0),
                },
            )
            .await?;
        Ok(result.node)
    }

    /// Call a function on a remote object and keep the result as a remote reference
    pub async fn call_function_for_object(
        &self,
        object_id: &str,
        function_declaration: &str,
    ) -> Result<String> {
        let result: RuntimeCallFunctionOnResult = self
            .send(
                "Runtime.callFunctionOn",
                &RuntimeCallFunctionOn {
                    function_declaration: function_declaration.to_string(),
                    object_id: Some(object_id.to_string()),
                    return_by_value: Some(false),
                    object_group: Some(OBJECT_GROUP.to_string()),
                },
            )
            .await?;

        if let Some(exception) = result.exception_details {
            return Err(Error::cdp("Runtime.callFunctionOn", -1, exception.text));
        }
        result.result.object_id.ok_or_else(|| {
            Error::cdp(
                "Runtime.callFunctionOn",
                -1,
                format!("function returned a {} by value", result.result.r#type),
            )
        })
    }
}
