//! In-process transport. The test peer holds a [`MemoryPeer`] and the
//! session gets the other two halves.

use async_trait::async_trait;
use tokio::sync::mpsc;

use brain_core::frames::{InboundFrame, OutboundFrame};

use super::{decode_frame, FrameSender, FrameSource, Outgoing, TransportError};

/// Create a connected transport. `capacity` bounds the outbound queue.
pub fn pair(capacity: usize) -> (MemoryPeer, FrameSender, MemorySource) {
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let peer = MemoryPeer {
        inbound: Some(in_tx),
        outbound: out_rx,
        close: None,
    };
    (peer, FrameSender::new(out_tx), MemorySource { rx: in_rx })
}

/// Inbound half backed by a channel of raw text messages.
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Result<Option<InboundFrame>, TransportError> {
        match self.rx.recv().await {
            Some(text) => decode_frame(&text).map(Some),
            None => Ok(None),
        }
    }
}

/// The far end of an in-memory transport.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<String>>,
    outbound: mpsc::Receiver<Outgoing>,
    close: Option<(u16, String)>,
}

impl MemoryPeer {
    /// Send a frame to the session.
    pub fn send(&self, frame: &InboundFrame) {
        match serde_json::to_string(frame) {
            Ok(text) => self.send_raw(text),
            Err(e) => tracing::error!(error = %e, "failed to encode test frame"),
        }
    }

    /// Send arbitrary text, decodable or not.
    pub fn send_raw(&self, text: impl Into<String>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(text.into());
        }
    }

    /// Next frame from the session. `None` once the session closed the
    /// stream or dropped every sender.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        if self.close.is_some() {
            return None;
        }
        match self.outbound.recv().await? {
            Outgoing::Frame(frame) => Some(frame),
            Outgoing::Close { code, reason } => {
                self.close = Some((code, reason));
                None
            }
        }
    }

    /// Frame already queued by the session, without waiting.
    pub fn try_recv(&mut self) -> Option<OutboundFrame> {
        if self.close.is_some() {
            return None;
        }
        match self.outbound.try_recv().ok()? {
            Outgoing::Frame(frame) => Some(frame),
            Outgoing::Close { code, reason } => {
                self.close = Some((code, reason));
                None
            }
        }
    }

    /// Close code and reason, once the session asked to close.
    pub fn close_frame(&self) -> Option<&(u16, String)> {
        self.close.as_ref()
    }

    /// End the inbound direction, as a peer hanging up would.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }
}
