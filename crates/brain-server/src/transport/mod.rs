//! Framed bidirectional stream between the server and one peer.
//!
//! The outbound half is a [`FrameSender`]: cloneable, and `send` never waits.
//! The inbound half is a [`FrameSource`] read by exactly one task.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use brain_core::frames::{InboundFrame, OutboundFrame};

/// Close code for an orderly end of session.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code when the server is going away.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code when the session failed.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("stream closed")]
    Closed,
    #[error("send queue full")]
    QueueFull,
    #[error("undecodable frame: {0}")]
    Decode(String),
    #[error("read failed: {0}")]
    Read(String),
}

impl TransportError {
    /// Whether the stream is unusable after this error. A frame that fails
    /// to decode leaves the stream intact.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// What the writer side of a transport is asked to put on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum Outgoing {
    Frame(OutboundFrame),
    Close { code: u16, reason: String },
}

/// Outbound half of a session stream.
#[derive(Clone, Debug)]
pub struct FrameSender {
    tx: mpsc::Sender<Outgoing>,
}

impl FrameSender {
    pub fn new(tx: mpsc::Sender<Outgoing>) -> Self {
        Self { tx }
    }

    /// Queue a frame for the writer. Fails instead of waiting when the queue
    /// is full or the writer is gone.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.tx.try_send(Outgoing::Frame(frame)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(Outgoing::Frame(frame)) => {
                tracing::warn!(kind = frame.kind(), "send queue full, dropping frame");
                TransportError::QueueFull
            }
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Ask the writer to close the stream after everything already queued.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let reason = reason.into();
        if self.tx.try_send(Outgoing::Close { code, reason }).is_err() {
            tracing::debug!(code, "close not queued, writer gone or queue full");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Inbound half of a session stream.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame from the peer. `Ok(None)` on orderly close.
    async fn recv(&mut self) -> Result<Option<InboundFrame>, TransportError>;
}

/// Decode one text message into a frame.
pub fn decode_frame(text: &str) -> Result<InboundFrame, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_core::frames::{RunResponse, SessionEndAck};

    #[test]
    fn decode_errors_are_not_fatal() {
        let err = decode_frame("not json").unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
        assert!(!err.is_fatal());
        assert!(TransportError::Closed.is_fatal());
        assert!(TransportError::Read("reset".into()).is_fatal());
    }

    #[test]
    fn decode_valid_frame() {
        let frame = decode_frame(r#"{"type":"session_end","reason":"user quit"}"#).unwrap();
        assert_eq!(frame.kind(), "session_end");
    }

    #[test]
    fn send_never_waits() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = FrameSender::new(tx);

        let ack = OutboundFrame::SessionEndAck(SessionEndAck { acknowledged: true });
        sender.send(ack.clone()).unwrap();
        let err = sender
            .send(OutboundFrame::RunResponse(RunResponse { content: "x".into() }))
            .unwrap_err();
        assert!(matches!(err, TransportError::QueueFull));

        assert_eq!(rx.try_recv().unwrap(), Outgoing::Frame(ack));
        drop(rx);
        assert!(matches!(sender.send(OutboundFrame::SessionEndAck(SessionEndAck { acknowledged: true })), Err(TransportError::Closed)));
        assert!(sender.is_closed());
    }
}
