//! The tool-call bridge: one session per stream.

pub mod controller;
pub mod correlation;
pub mod dispatch;
pub mod receive;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use brain_core::declarations::ProtocolError;
use brain_core::ids::SessionId;
use brain_engine::EngineError;

use crate::transport::TransportError;
use correlation::CorrelationTable;

pub use controller::SessionController;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl SessionError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::Transport(_) => "transport",
            Self::Engine(e) => e.error_kind(),
        }
    }
}

/// State of one live session, shared by its dispatch tools, its receive
/// loop, and the session registry.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    /// Names of the top-level agents declared by the peer.
    pub agents: Vec<String>,
    table: Arc<CorrelationTable>,
    end_reason: Mutex<Option<String>>,
}

impl Session {
    pub fn new(agents: Vec<String>) -> Self {
        Self {
            id: SessionId::new(),
            started_at: Utc::now(),
            agents,
            table: Arc::new(CorrelationTable::new()),
            end_reason: Mutex::new(None),
        }
    }

    pub fn table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }

    pub fn pending_calls(&self) -> usize {
        self.table.len()
    }

    /// Record why the peer ended the session. The last reason wins.
    pub fn record_end(&self, reason: String) {
        *self.end_reason.lock() = Some(reason);
    }

    pub fn end_reason(&self) -> Option<String> {
        self.end_reason.lock().clone()
    }
}
