//! Hand-written CDP types for the DOM and Page traffic we track
//!
//! Only the events that move the frame tree and the three commands the
//! resolver needs. Everything else on the wire is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A CDP event as delivered by the transport
#[derive(Debug, Clone)]
pub struct CdpMessage {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

impl CdpMessage {
    /// Build an event message with no session attached
    pub fn event(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            session_id: None,
        }
    }

    /// Attach the flattened-session id the event arrived on
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

// =========================================================================
// Events
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DOMChildNodeRemovedEvent {
    pub parent_node_id: i32,
    pub node_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DOMChildNodeInsertedEvent {
    pub parent_node_id: i32,
    #[serde(default)]
    pub previous_node_id: i32,
    pub node: DOMNode,
}

/// DOM.Node, trimmed to what frame tracking reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DOMNode {
    #[serde(default)]
    pub node_id: i32,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub frame_id: Option<String>,
    #[serde(default)]
    pub content_document: Option<Box<DOMNode>>,
}

impl DOMNode {
    /// `<iframe>` or `<frame>` element
    pub fn is_frame_owner(&self) -> bool {
        self.node_name.eq_ignore_ascii_case("IFRAME") || self.node_name.eq_ignore_ascii_case("FRAME")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFrameDetachedEvent {
    #[serde(default)]
    pub frame_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

// =========================================================================
// Commands
// =========================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DOMResolveNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DOMResolveNodeResult {
    #[serde(default)]
    pub object: RemoteObject,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DOMDescribeNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DOMDescribeNodeResult {
    #[serde(default)]
    pub node: DOMNode,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCallFunctionOn {
    pub function_declaration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCallFunctionOnResult {
    #[serde(default)]
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub text: String,
    #[serde(default)]
    pub line_number: i32,
    #[serde(default)]
    pub column_number: i32,
}
