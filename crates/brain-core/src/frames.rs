//! Session wire protocol.
//!
//! One JSON object per transport message, discriminated by `type`. The peer
//! opens a session with `run_request`, answers `tool_call_request`s with
//! `tool_call_response`s, and may announce `session_end`. The server replies
//! with exactly one `run_response` followed by one `session_end_ack` when the
//! run succeeds.

use serde::{Deserialize, Serialize};

use crate::ids::RequestId;

/// Frames sent by the peer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    RunRequest(RunRequest),
    ToolCallResponse(ToolCallResponse),
    SessionEnd(SessionEnd),
}

impl InboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunRequest(_) => "run_request",
            Self::ToolCallResponse(_) => "tool_call_response",
            Self::SessionEnd(_) => "session_end",
        }
    }
}

/// Frames sent to the peer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    ToolCallRequest(ToolCallRequest),
    RunResponse(RunResponse),
    SessionEndAck(SessionEndAck),
}

impl OutboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolCallRequest(_) => "tool_call_request",
            Self::RunResponse(_) => "run_response",
            Self::SessionEndAck(_) => "session_end_ack",
        }
    }
}

/// Initiating frame. Fields are optional on the wire so that a request
/// missing them decodes and can be rejected with a precise protocol error.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RunRequest {
    #[serde(default)]
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<AgentSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_agents: Vec<AgentSpec>,
}

/// Tool as declared by the peer. Schemas are JSON Schema documents encoded
/// as strings; an empty string means "no schema".
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: String,
    #[serde(default)]
    pub output_schema: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub request_id: RequestId,
    pub tool_name: String,
    /// JSON-encoded tool input.
    pub input: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResponse {
    pub request_id: RequestId,
    /// JSON-encoded tool output. Absent or empty means the peer produced none.
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionEnd {
    #[serde(default)]
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunResponse {
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionEndAck {
    pub acknowledged: bool,
}
