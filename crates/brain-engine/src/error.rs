use brain_core::errors::GatewayError;
use brain_core::tools::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("agent aborted")]
    Aborted,

    #[error("max turns exceeded: {0}")]
    MaxTurnsExceeded(u32),

    #[error("max delegation depth exceeded: {0}")]
    DelegationDepth(u32),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Gateway(e) => e.error_kind(),
            Self::Tool(e) => e.error_kind(),
            Self::Aborted => "aborted",
            Self::MaxTurnsExceeded(_) => "max_turns",
            Self::DelegationDepth(_) => "delegation_depth",
            Self::Internal(_) => "internal",
        }
    }
}
