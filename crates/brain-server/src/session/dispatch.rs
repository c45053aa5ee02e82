use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use brain_core::declarations::ToolDeclaration;
use brain_core::frames::{OutboundFrame, ToolCallRequest, ToolCallResponse};
use brain_core::ids::RequestId;
use brain_core::tools::{Tool, ToolContext, ToolError, ToolResult};

use super::correlation::CorrelationTable;
use crate::transport::FrameSender;

/// A tool executed by the connected peer. Each call becomes one
/// `tool_call_request` and waits, bounded, for the matching response.
pub struct RemoteTool {
    declaration: ToolDeclaration,
    table: Arc<CorrelationTable>,
    sender: FrameSender,
    timeout: Duration,
}

impl RemoteTool {
    pub fn new(
        declaration: ToolDeclaration,
        table: Arc<CorrelationTable>,
        sender: FrameSender,
        timeout: Duration,
    ) -> Self {
        Self {
            declaration,
            table,
            sender,
            timeout,
        }
    }

    /// One round trip to the peer: register, send, wait.
    pub async fn dispatch(
        &self,
        input: String,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let request_id = RequestId::new();
        let tool_name = self.declaration.name.as_str();

        // Registered before the send so a fast response always finds its slot.
        let mut pending = self.table.register(request_id.clone()).ok_or_else(|| {
            ToolError::ExecutionFailed(format!("request id {request_id} already pending"))
        })?;

        let frame = OutboundFrame::ToolCallRequest(ToolCallRequest {
            request_id: request_id.clone(),
            tool_name: tool_name.to_string(),
            input,
        });
        if let Err(e) = self.sender.send(frame) {
            self.table.expire(&request_id);
            warn!(%request_id, tool_name, error = %e, "failed to send tool call request");
            return Err(ToolError::Transport(e.to_string()));
        }
        debug!(%request_id, tool_name, agent = %ctx.agent_name, "tool call request sent");

        let outcome = tokio::select! {
            res = tokio::time::timeout(self.timeout, &mut pending.slot) => res,
            _ = ctx.abort_signal.cancelled() => {
                self.table.expire(&request_id);
                return Err(ToolError::Cancelled);
            }
        };

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                warn!(%request_id, tool_name, "response slot closed");
                return Err(ToolError::Transport("response slot closed".into()));
            }
            Err(_elapsed) => {
                if self.table.expire(&request_id) {
                    warn!(%request_id, tool_name, timeout_secs = self.timeout.as_secs(), "tool call timed out");
                    return Err(ToolError::Timeout(self.timeout));
                }
                // The receive loop took the entry between the deadline and the expire.
                match pending.slot.try_recv() {
                    Ok(response) => response,
                    Err(_) => return Err(ToolError::Timeout(self.timeout)),
                }
            }
        };

        debug!(%request_id, tool_name, "tool call response received");
        decode_output(response)
    }
}

fn decode_output(response: ToolCallResponse) -> Result<serde_json::Value, ToolError> {
    match response.output {
        Some(output) if !output.is_empty() => {
            serde_json::from_str(&output).map_err(|e| ToolError::Decode(e.to_string()))
        }
        _ => Err(ToolError::EmptyResponse),
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.declaration.name
    }

    fn description(&self) -> &str {
        &self.declaration.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.declaration.input_schema.to_value()
    }

    fn output_schema(&self) -> Option<serde_json::Value> {
        Some(self.declaration.output_schema.to_value())
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let start = Instant::now();
        let input =
            serde_json::to_string(&args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let output = self.dispatch(input, ctx).await?;
        Ok(ToolResult {
            output,
            is_error: false,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_core::declarations::ToolSchema;
    use brain_core::ids::{AgentId, SessionId};
    use tokio_util::sync::CancellationToken;

    use crate::transport::memory::{self, MemoryPeer};

    const TIMEOUT: Duration = Duration::from_secs(180);

    fn echo_decl() -> ToolDeclaration {
        ToolDeclaration {
            name: "echo".into(),
            description: "echo input".into(),
            input_schema: ToolSchema::Empty,
            output_schema: ToolSchema::Empty,
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            session_id: SessionId::new(),
            agent_id: AgentId::new(),
            agent_name: "desktop".into(),
            abort_signal: CancellationToken::new(),
        }
    }

    fn setup() -> (Arc<RemoteTool>, Arc<CorrelationTable>, MemoryPeer) {
        let (peer, sender, _source) = memory::pair(16);
        let table = Arc::new(CorrelationTable::new());
        let tool = RemoteTool::new(echo_decl(), Arc::clone(&table), sender, TIMEOUT);
        (Arc::new(tool), table, peer)
    }

    async fn next_request(peer: &mut MemoryPeer) -> ToolCallRequest {
        match peer.recv().await {
            Some(OutboundFrame::ToolCallRequest(req)) => req,
            other => panic!("expected tool_call_request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let (tool, table, mut peer) = setup();
        let call = tokio::spawn({
            let tool = Arc::clone(&tool);
            async move { tool.execute(serde_json::json!({"x": 1}), &ctx()).await }
        });

        let req = next_request(&mut peer).await;
        assert_eq!(req.tool_name, "echo");
        assert_eq!(req.input, r#"{"x":1}"#);
        assert_eq!(table.len(), 1);

        assert!(table.resolve(ToolCallResponse {
            request_id: req.request_id,
            output: Some(r#"{"x":1}"#.into()),
        }));
        let result = call.await.unwrap().unwrap();
        assert_eq!(result.output, serde_json::json!({"x": 1}));
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out() {
        let (tool, table, mut peer) = setup();
        let call = tokio::spawn({
            let tool = Arc::clone(&tool);
            async move { tool.dispatch("{}".into(), &ctx()).await }
        });

        let req = next_request(&mut peer).await;
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ToolError::Timeout(d) if d == TIMEOUT));
        assert!(table.is_empty());

        // A late response for the expired id is dropped.
        assert!(!table.resolve(ToolCallResponse {
            request_id: req.request_id,
            output: Some("{}".into()),
        }));
    }

    #[tokio::test]
    async fn empty_output_is_distinct_from_timeout() {
        for output in [None, Some(String::new())] {
            let (tool, table, mut peer) = setup();
            let call = tokio::spawn({
                let tool = Arc::clone(&tool);
                async move { tool.dispatch("{}".into(), &ctx()).await }
            });
            let req = next_request(&mut peer).await;
            table.resolve(ToolCallResponse {
                request_id: req.request_id,
                output,
            });
            let err = call.await.unwrap().unwrap_err();
            assert!(matches!(err, ToolError::EmptyResponse));
        }
    }

    #[tokio::test]
    async fn undecodable_output_is_decode_error() {
        let (tool, table, mut peer) = setup();
        let call = tokio::spawn({
            let tool = Arc::clone(&tool);
            async move { tool.dispatch("{}".into(), &ctx()).await }
        });
        let req = next_request(&mut peer).await;
        table.resolve(ToolCallResponse {
            request_id: req.request_id,
            output: Some("not json".into()),
        });
        assert!(matches!(call.await.unwrap(), Err(ToolError::Decode(_))));
    }

    #[tokio::test]
    async fn out_of_order_responses_resolve_independently() {
        let (tool, table, mut peer) = setup();
        let a = tokio::spawn({
            let tool = Arc::clone(&tool);
            async move { tool.dispatch(r#""a""#.into(), &ctx()).await }
        });
        let req_a = next_request(&mut peer).await;
        let b = tokio::spawn({
            let tool = Arc::clone(&tool);
            async move { tool.dispatch(r#""b""#.into(), &ctx()).await }
        });
        let req_b = next_request(&mut peer).await;
        assert_ne!(req_a.request_id, req_b.request_id);

        table.resolve(ToolCallResponse {
            request_id: req_b.request_id,
            output: Some(r#""B""#.into()),
        });
        assert_eq!(b.await.unwrap().unwrap(), serde_json::json!("B"));
        assert_eq!(table.len(), 1);

        table.resolve(ToolCallResponse {
            request_id: req_a.request_id,
            output: Some(r#""A""#.into()),
        });
        assert_eq!(a.await.unwrap().unwrap(), serde_json::json!("A"));
    }

    #[tokio::test]
    async fn send_failure_expires_entry() {
        let (peer, sender, _source) = memory::pair(16);
        drop(peer);
        let table = Arc::new(CorrelationTable::new());
        let tool = RemoteTool::new(echo_decl(), Arc::clone(&table), sender, TIMEOUT);

        let err = tool.dispatch("{}".into(), &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::Transport(_)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn cancellation_expires_entry() {
        let (tool, table, mut peer) = setup();
        let ctx = ctx();
        let cancel = ctx.abort_signal.clone();
        let call = tokio::spawn({
            let tool = Arc::clone(&tool);
            async move { tool.dispatch("{}".into(), &ctx).await }
        });
        next_request(&mut peer).await;
        cancel.cancel();

        assert!(matches!(call.await.unwrap(), Err(ToolError::Cancelled)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn dropped_slot_is_a_transport_error() {
        let (tool, table, mut peer) = setup();
        let call = tokio::spawn({
            let tool = Arc::clone(&tool);
            async move { tool.dispatch("{}".into(), &ctx()).await }
        });
        let req = next_request(&mut peer).await;
        // Removing the entry drops the responder without a reply.
        assert!(table.expire(&req.request_id));

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ToolError::Transport(ref m) if m.contains("slot closed")));
    }

    #[test]
    fn schemas_never_null_and_output_kept_as_declared() {
        let (tool, _table, _peer) = setup();
        assert_eq!(
            tool.parameters_schema(),
            serde_json::json!({"type": "object", "properties": {}})
        );
        assert_eq!(
            tool.to_definition().output_schema,
            Some(serde_json::json!({"type": "object", "properties": {}}))
        );

        let (_peer, sender, _source) = memory::pair(1);
        let decl = ToolDeclaration {
            output_schema: ToolSchema::Declared(serde_json::json!({"type": "string"})),
            ..echo_decl()
        };
        let titled = RemoteTool::new(decl, Arc::new(CorrelationTable::new()), sender, TIMEOUT);
        assert_eq!(
            titled.to_definition().output_schema,
            Some(serde_json::json!({"type": "string"}))
        );
    }
}
