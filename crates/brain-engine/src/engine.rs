use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use brain_core::ids::SessionId;
use brain_core::provider::LlmProvider;

use crate::agent::Agent;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::runner::{AgentRunner, RunnerConfig};

/// Everything one engine run needs.
pub struct EngineRun {
    pub session_id: SessionId,
    pub root: Agent,
    pub user_message: String,
    pub cancel: CancellationToken,
}

/// Plans and sequences tool use for a tree of agents.
///
/// Implementations report progress through `events` and return once the
/// plan is exhausted. All tool use goes through the tools on the agents.
#[async_trait]
pub trait OrchestrationEngine: Send + Sync {
    async fn run(
        &self,
        run: EngineRun,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<(), EngineError>;
}

/// Model-driven engine: runs the root agent's turn loop against a provider.
pub struct LlmEngine {
    provider: Arc<dyn LlmProvider>,
    config: RunnerConfig,
}

impl LlmEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, config: RunnerConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl OrchestrationEngine for LlmEngine {
    #[instrument(
        skip_all,
        fields(session_id = %run.session_id, root = %run.root.name, model = %self.provider.model())
    )]
    async fn run(
        &self,
        run: EngineRun,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<(), EngineError> {
        let runner = Arc::new(AgentRunner::new(
            Arc::clone(&self.provider),
            self.config.clone(),
            run.session_id,
            events,
            run.cancel,
        ));
        let root = Arc::new(run.root);
        let text = runner.run(&root, run.user_message, 0).await?;
        info!(chars = text.len(), "engine run complete");
        Ok(())
    }
}
