use brain_core::ids::ToolCallId;
use serde::Serialize;

/// Something the engine did while running, attributed to one agent.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EngineEvent {
    pub agent: String,
    #[serde(flatten)]
    pub kind: EngineEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEventKind {
    Text { text: String },
    ToolCall { call_id: ToolCallId, name: String },
    ToolResult { call_id: ToolCallId, name: String, is_error: bool },
    Transfer { to: String },
}

impl EngineEvent {
    pub fn new(agent: impl Into<String>, kind: EngineEventKind) -> Self {
        Self {
            agent: agent.into(),
            kind,
        }
    }

    /// Text carried by this event, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EngineEventKind::Text { text } => Some(text),
            _ => None,
        }
    }
}
