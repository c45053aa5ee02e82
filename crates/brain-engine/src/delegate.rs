use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use brain_core::tools::{ExecutionMode, Tool, ToolContext, ToolError, ToolResult};

use crate::agent::Agent;
use crate::error::EngineError;
use crate::events::EngineEventKind;
use crate::runner::AgentRunner;

pub const DELEGATION_PREFIX: &str = "transfer_to_";

/// Exposes a sub-agent to its parent as a tool. Calling it runs the
/// sub-agent's own turn loop on the given task and returns its final text.
pub struct DelegateTool {
    name: String,
    description: String,
    runner: Arc<AgentRunner>,
    agent: Arc<Agent>,
    depth: u32,
}

impl DelegateTool {
    pub fn new(runner: Arc<AgentRunner>, agent: Arc<Agent>, depth: u32) -> Self {
        let name = format!("{DELEGATION_PREFIX}{}", agent.name);
        let description = format!(
            "Hand a task to the `{}` agent and return its final answer.",
            agent.name
        );
        Self {
            name,
            description,
            runner,
            agent,
            depth,
        }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "What the agent should do, with all context it needs"
                }
            },
            "required": ["task"]
        })
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Sequential
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let task = args
            .get("task")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing required string 'task'".into()))?
            .to_string();

        info!(from = %ctx.agent_name, to = %self.agent.name, depth = self.depth, "delegating");
        self.runner.emit(
            &ctx.agent_name,
            EngineEventKind::Transfer {
                to: self.agent.name.clone(),
            },
        );

        let start = Instant::now();
        match self.runner.run(&self.agent, task, self.depth).await {
            Ok(text) => Ok(ToolResult {
                output: serde_json::Value::String(text),
                is_error: false,
                duration: start.elapsed(),
            }),
            Err(EngineError::Aborted) => Err(ToolError::Cancelled),
            Err(e) => Err(ToolError::ExecutionFailed(format!(
                "agent `{}` failed: {e}",
                self.agent.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use brain_core::ids::{AgentId, SessionId};
    use brain_llm::{MockProvider, MockResponse};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::events::EngineEvent;
    use crate::runner::RunnerConfig;

    fn setup(
        responses: Vec<MockResponse>,
    ) -> (Arc<AgentRunner>, mpsc::UnboundedReceiver<EngineEvent>, ToolContext) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = SessionId::new();
        let runner = Arc::new(AgentRunner::new(
            Arc::new(MockProvider::new(responses)),
            RunnerConfig::default(),
            session_id.clone(),
            tx,
            CancellationToken::new(),
        ));
        let ctx = ToolContext {
            session_id,
            agent_id: AgentId::new(),
            agent_name: "root_agent".into(),
            abort_signal: CancellationToken::new(),
        };
        (runner, rx, ctx)
    }

    #[test]
    fn name_and_mode() {
        let (runner, _rx, _ctx) = setup(vec![]);
        let tool = DelegateTool::new(runner, Arc::new(Agent::new("researcher", "")), 1);
        assert_eq!(tool.name(), "transfer_to_researcher");
        assert_eq!(tool.execution_mode(), ExecutionMode::Sequential);
        assert_eq!(tool.parameters_schema()["required"][0], "task");
    }

    #[tokio::test]
    async fn runs_sub_agent_and_returns_text() {
        let (runner, mut rx, ctx) = setup(vec![MockResponse::stream_text("sub answer")]);
        let tool = DelegateTool::new(runner, Arc::new(Agent::new("helper", "help")), 1);

        let result = tool
            .execute(serde_json::json!({"task": "do it"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.output_text(), "sub answer");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.agent, "root_agent");
        assert_eq!(first.kind, EngineEventKind::Transfer { to: "helper".into() });
        let second = rx.try_recv().unwrap();
        assert_eq!(second.agent, "helper");
        assert_eq!(second.text(), Some("sub answer"));
    }

    #[tokio::test]
    async fn missing_task_rejected() {
        let (runner, _rx, ctx) = setup(vec![]);
        let tool = DelegateTool::new(runner, Arc::new(Agent::new("helper", "")), 1);

        let err = tool.execute(serde_json::json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn sub_agent_failure_is_tool_error() {
        let (runner, _rx, ctx) = setup(vec![MockResponse::Error(
            brain_core::errors::GatewayError::ServerError {
                status: 500,
                body: "boom".into(),
            },
        )]);
        let tool = DelegateTool::new(runner, Arc::new(Agent::new("helper", "")), 1);

        let err = tool
            .execute(serde_json::json!({"task": "x"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("helper"));
    }
}
