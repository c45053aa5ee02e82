use std::sync::Arc;

use brain_core::tools::Tool;

use crate::registry::ToolRegistry;

/// An agent the engine can run: its own instruction, the tools it may call,
/// and the sub-agents it may hand work to.
#[derive(Clone, Debug)]
pub struct Agent {
    pub name: String,
    pub instruction: String,
    pub tools: ToolRegistry,
    pub sub_agents: Vec<Arc<Agent>>,
}

impl Agent {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            tools: ToolRegistry::new(),
            sub_agents: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_sub_agent(mut self, agent: Agent) -> Self {
        self.sub_agents.push(Arc::new(agent));
        self
    }
}
