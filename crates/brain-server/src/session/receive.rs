use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use brain_core::frames::InboundFrame;

use super::Session;
use crate::transport::{FrameSource, TransportError};

/// Why a receive loop stopped.
#[derive(Debug)]
pub enum LoopExit {
    /// The peer closed the stream.
    Closed,
    /// The controller cancelled the loop.
    Cancelled,
    /// The stream failed.
    Failed(TransportError),
}

/// Read frames until the stream ends or `cancel` fires. Responses resolve
/// pending calls; `session_end` is recorded; everything else is ignored.
pub async fn receive_loop<S: FrameSource>(
    mut source: S,
    session: Arc<Session>,
    cancel: CancellationToken,
) -> LoopExit {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return LoopExit::Cancelled,
            next = source.recv() => next,
        };

        match next {
            Ok(Some(InboundFrame::ToolCallResponse(response))) => {
                let request_id = response.request_id.clone();
                if session.table().resolve(response) {
                    debug!(session_id = %session.id, %request_id, "tool call resolved");
                } else {
                    debug!(session_id = %session.id, %request_id, "dropping response for unknown or resolved request");
                }
            }
            Ok(Some(InboundFrame::SessionEnd(end))) => {
                info!(session_id = %session.id, reason = %end.reason, "peer ended session");
                session.record_end(end.reason);
            }
            Ok(Some(frame @ InboundFrame::RunRequest(_))) => {
                warn!(session_id = %session.id, kind = frame.kind(), "ignoring frame after session start");
            }
            Ok(None) => {
                debug!(session_id = %session.id, "stream closed");
                return LoopExit::Closed;
            }
            Err(e) if !e.is_fatal() => {
                warn!(session_id = %session.id, error = %e, "ignoring undecodable frame");
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "stream read failed");
                return LoopExit::Failed(e);
            }
        }
    }
}
