use crate::errors::GatewayError;
use crate::messages::{AssistantMessage, StopReason, ToolCallBlock};

/// Events emitted while a provider produces one assistant message.
///
/// Start → (TextDelta | ToolCallEnd)* → Done, or Error at any point.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Start,
    TextDelta { delta: String },
    ToolCallEnd { tool_call: ToolCallBlock },
    Done { message: AssistantMessage, stop_reason: StopReason },
    Error { error: GatewayError },
}
