use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, Span};

use brain_core::declarations::{AgentDeclaration, ProtocolError, SessionPlan};
use brain_core::frames::{InboundFrame, OutboundFrame, RunResponse, SessionEndAck};
use brain_engine::{Agent, EngineEvent, EngineRun, OrchestrationEngine};

use super::dispatch::RemoteTool;
use super::receive::{receive_loop, LoopExit};
use super::{Session, SessionError};
use crate::registry::SessionRegistry;
use crate::transport::{FrameSender, FrameSource};

/// Name of the agent the engine runs first. The peer's agents hang below it.
pub const ROOT_AGENT: &str = "root_agent";

/// Runs sessions: validates the initiating frame, wires declared tools to
/// the stream, drives the engine, and sends the terminal frames.
pub struct SessionController {
    engine: Arc<dyn OrchestrationEngine>,
    registry: Arc<SessionRegistry>,
    tool_timeout: Duration,
}

impl SessionController {
    pub fn new(
        engine: Arc<dyn OrchestrationEngine>,
        registry: Arc<SessionRegistry>,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            registry,
            tool_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Run one session to completion and return the text sent in
    /// `run_response`.
    ///
    /// An invalid initiating frame fails before anything is started. Once
    /// the receive loop is running it is cancelled and joined before this
    /// returns, on every path.
    #[instrument(skip_all, fields(session_id = tracing::field::Empty))]
    pub async fn run_session<S>(
        &self,
        first: InboundFrame,
        sender: FrameSender,
        source: S,
    ) -> Result<String, SessionError>
    where
        S: FrameSource + 'static,
    {
        let plan = match first {
            InboundFrame::RunRequest(request) => request.into_plan()?,
            other => return Err(ProtocolError::NotARunRequest(other.kind()).into()),
        };

        let session = Arc::new(Session::new(
            plan.agents.iter().map(|a| a.name.clone()).collect(),
        ));
        Span::current().record("session_id", tracing::field::display(&session.id));
        let _tracked = self.registry.track(Arc::clone(&session));

        let root = self.build_root(&plan, &session, &sender);
        info!(
            agents = plan.agents.len(),
            tools = plan.agents.iter().map(AgentDeclaration::tool_count).sum::<usize>(),
            "session started"
        );

        // Cancels the loop even if this future is dropped mid-run.
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        let receive = tokio::spawn(receive_loop(source, Arc::clone(&session), cancel.clone()));

        let outcome = self
            .run_engine(&session, root, plan.user_message, &cancel, &sender)
            .await;

        cancel.cancel();
        match receive.await {
            Ok(LoopExit::Failed(e)) => debug!(error = %e, "receive loop ended with error"),
            Ok(exit) => debug!(?exit, "receive loop joined"),
            Err(e) => error!(error = %e, "receive loop task failed"),
        }

        match &outcome {
            Ok(content) => info!(chars = content.len(), "session complete"),
            Err(e) => error!(error = %e, error_kind = e.error_kind(), "session failed"),
        }
        outcome
    }

    async fn run_engine(
        &self,
        session: &Session,
        root: Agent,
        user_message: String,
        cancel: &CancellationToken,
        sender: &FrameSender,
    ) -> Result<String, SessionError> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let run = EngineRun {
            session_id: session.id.clone(),
            root,
            user_message,
            cancel: cancel.child_token(),
        };
        let result = self.engine.run(run, events_tx).await;

        let mut content = String::new();
        while let Ok(event) = events_rx.try_recv() {
            trace_event(&event);
            if let Some(text) = event.text() {
                content.push_str(text);
            }
        }
        result?;

        sender.send(OutboundFrame::RunResponse(RunResponse {
            content: content.clone(),
        }))?;
        sender.send(OutboundFrame::SessionEndAck(SessionEndAck { acknowledged: true }))?;
        Ok(content)
    }

    fn build_root(&self, plan: &SessionPlan, session: &Session, sender: &FrameSender) -> Agent {
        plan.agents
            .iter()
            .fold(Agent::new(ROOT_AGENT, plan.instruction.clone()), |root, decl| {
                root.with_sub_agent(self.build_agent(decl, session, sender))
            })
    }

    fn build_agent(&self, decl: &AgentDeclaration, session: &Session, sender: &FrameSender) -> Agent {
        let agent = decl.tools.iter().fold(
            Agent::new(decl.name.clone(), decl.instruction.clone()),
            |agent, tool| {
                agent.with_tool(Arc::new(RemoteTool::new(
                    tool.clone(),
                    Arc::clone(session.table()),
                    sender.clone(),
                    self.tool_timeout,
                )))
            },
        );
        decl.sub_agents.iter().fold(agent, |agent, sub| {
            agent.with_sub_agent(self.build_agent(sub, session, sender))
        })
    }
}

fn trace_event(event: &EngineEvent) {
    debug!(agent = %event.agent, event = ?event.kind, "engine event");
}
