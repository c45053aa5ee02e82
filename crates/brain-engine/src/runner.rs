use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use brain_core::context::LlmContext;
use brain_core::ids::{AgentId, SessionId};
use brain_core::messages::{AssistantMessage, Message, ToolCallBlock};
use brain_core::provider::{LlmProvider, StreamOptions};
use brain_core::stream::StreamEvent;
use brain_core::tools::{ExecutionMode, Tool, ToolContext};

use crate::agent::Agent;
use crate::delegate::DelegateTool;
use crate::error::EngineError;
use crate::events::{EngineEvent, EngineEventKind};
use crate::registry::ToolRegistry;

/// Configuration for the agent runner.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Model turns allowed per agent run before giving up.
    pub max_turns: u32,
    /// How many levels of sub-agent delegation are offered below the root.
    pub max_delegation_depth: u32,
    pub stream_options: StreamOptions,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_turns: 25,
            max_delegation_depth: 3,
            stream_options: StreamOptions::default(),
        }
    }
}

/// Runs agents for one engine run: build context → stream → collect → tool execution,
/// repeated until the model stops calling tools.
pub struct AgentRunner {
    provider: Arc<dyn LlmProvider>,
    config: RunnerConfig,
    session_id: SessionId,
    events: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
}

impl AgentRunner {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: RunnerConfig,
        session_id: SessionId,
        events: mpsc::UnboundedSender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            config,
            session_id,
            events,
            cancel,
        }
    }

    pub(crate) fn emit(&self, agent: &str, kind: EngineEventKind) {
        if self.events.send(EngineEvent::new(agent, kind)).is_err() {
            debug!(agent, "no event receiver, event dropped");
        }
    }

    /// Run `agent` on `task` and return the text of its final answer.
    #[instrument(skip(self, agent, task), fields(session_id = %self.session_id, agent = %agent.name))]
    pub async fn run(
        self: &Arc<Self>,
        agent: &Arc<Agent>,
        task: String,
        depth: u32,
    ) -> Result<String, EngineError> {
        if depth > self.config.max_delegation_depth {
            return Err(EngineError::DelegationDepth(self.config.max_delegation_depth));
        }

        let tools = self.tools_for(agent, depth);
        let agent_id = AgentId::new();
        let mut messages = vec![Message::user_text(task)];

        for turn in 1..=self.config.max_turns {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Aborted);
            }

            let assistant = self.execute_turn(agent, &tools, &messages, turn).await?;
            let tool_calls: Vec<ToolCallBlock> =
                assistant.tool_calls().into_iter().cloned().collect();
            let final_text = assistant.text_content();
            messages.push(Message::Assistant(assistant));

            if tool_calls.is_empty() {
                return Ok(final_text);
            }

            let results = self
                .execute_tools(agent, &agent_id, &tools, &tool_calls)
                .await;
            messages.extend(results);
        }

        Err(EngineError::MaxTurnsExceeded(self.config.max_turns))
    }

    /// The agent's own tools plus one delegation tool per sub-agent.
    fn tools_for(self: &Arc<Self>, agent: &Arc<Agent>, depth: u32) -> ToolRegistry {
        let mut tools = agent.tools.clone();
        if agent.sub_agents.is_empty() {
            return tools;
        }
        if depth >= self.config.max_delegation_depth {
            debug!(agent = %agent.name, depth, "delegation depth reached, sub-agents hidden");
            return tools;
        }
        for sub in &agent.sub_agents {
            let tool = DelegateTool::new(Arc::clone(self), Arc::clone(sub), depth + 1);
            tools.register(Arc::new(tool));
        }
        tools
    }

    async fn execute_turn(
        &self,
        agent: &Agent,
        tools: &ToolRegistry,
        messages: &[Message],
        turn: u32,
    ) -> Result<AssistantMessage, EngineError> {
        let context = LlmContext {
            system_instruction: Some(agent.instruction.clone()).filter(|s| !s.trim().is_empty()),
            messages: messages.to_vec(),
            tools: tools.definitions(),
        };

        let mut stream = self
            .provider
            .stream(&context, &self.config.stream_options)
            .await?;

        let mut assistant = None;
        while let Some(event) = stream.next().await {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Aborted);
            }
            match event {
                StreamEvent::TextDelta { delta } => {
                    self.emit(&agent.name, EngineEventKind::Text { text: delta });
                }
                StreamEvent::Done { message, .. } => assistant = Some(message),
                StreamEvent::Error { error } => return Err(EngineError::Gateway(error)),
                StreamEvent::Start | StreamEvent::ToolCallEnd { .. } => {}
            }
        }

        let assistant = assistant
            .ok_or_else(|| EngineError::Internal("stream ended without Done event".into()))?;
        debug!(
            agent = %agent.name,
            turn,
            tool_calls = assistant.tool_calls().len(),
            "turn complete"
        );
        Ok(assistant)
    }

    /// Execute one turn's tool calls. Concurrent tools run together, sequential
    /// tools one at a time afterwards; results come back in call order.
    async fn execute_tools(
        &self,
        agent: &Agent,
        agent_id: &AgentId,
        tools: &ToolRegistry,
        tool_calls: &[ToolCallBlock],
    ) -> Vec<Message> {
        let ctx = ToolContext {
            session_id: self.session_id.clone(),
            agent_id: agent_id.clone(),
            agent_name: agent.name.clone(),
            abort_signal: self.cancel.clone(),
        };

        let mut outcomes: Vec<Option<(String, bool)>> = vec![None; tool_calls.len()];
        let mut concurrent = Vec::new();
        let mut sequential = Vec::new();

        for (i, tc) in tool_calls.iter().enumerate() {
            self.emit(
                &agent.name,
                EngineEventKind::ToolCall {
                    call_id: tc.id.clone(),
                    name: tc.name.clone(),
                },
            );
            match tools.get(&tc.name) {
                None => {
                    warn!(agent = %agent.name, tool = %tc.name, "model called unknown tool");
                    outcomes[i] = Some((format!("Unknown tool: {}", tc.name), true));
                }
                Some(tool) => match tool.execution_mode() {
                    ExecutionMode::Concurrent => concurrent.push((i, tool)),
                    ExecutionMode::Sequential => sequential.push((i, tool)),
                },
            }
        }

        let batch = concurrent
            .into_iter()
            .map(|(i, tool)| {
                let ctx = &ctx;
                let tc = &tool_calls[i];
                async move { (i, invoke(tool, tc, ctx).await) }
            });
        for (i, outcome) in join_all(batch).await {
            outcomes[i] = Some(outcome);
        }

        for (i, tool) in sequential {
            outcomes[i] = Some(invoke(tool, &tool_calls[i], &ctx).await);
        }

        tool_calls
            .iter()
            .zip(outcomes)
            .map(|(tc, outcome)| {
                let (content, is_error) =
                    outcome.unwrap_or_else(|| ("Tool was not executed".into(), true));
                self.emit(
                    &agent.name,
                    EngineEventKind::ToolResult {
                        call_id: tc.id.clone(),
                        name: tc.name.clone(),
                        is_error,
                    },
                );
                let content = if is_error {
                    format!("[error] {content}")
                } else {
                    content
                };
                Message::tool_result(tc.id.clone(), tc.name.clone(), content, is_error)
            })
            .collect()
    }
}

/// Run one tool call, turning failures and panics into error text.
async fn invoke(tool: Arc<dyn Tool>, tc: &ToolCallBlock, ctx: &ToolContext) -> (String, bool) {
    let start = Instant::now();
    let result = std::panic::AssertUnwindSafe(tool.execute(tc.arguments.clone(), ctx))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(r)) => (r.output_text(), r.is_error),
        Ok(Err(e)) => {
            warn!(
                tool = %tc.name,
                error = %e,
                error_kind = e.error_kind(),
                duration_ms = start.elapsed().as_millis() as u64,
                "tool call failed"
            );
            (e.to_string(), true)
        }
        Err(panic) => {
            let msg = panic_message(&panic);
            error!(tool = %tc.name, panic = %msg, "tool panicked during execution");
            ("Internal error: tool crashed".into(), true)
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
