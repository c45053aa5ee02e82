use crate::messages::Message;
use crate::tools::ToolDefinition;

/// The complete context sent to a provider for one turn.
#[derive(Clone, Debug)]
pub struct LlmContext {
    pub system_instruction: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

impl LlmContext {
    /// Create an empty context (useful for testing).
    pub fn empty() -> Self {
        Self {
            system_instruction: None,
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }
}
