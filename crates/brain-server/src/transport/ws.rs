use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use brain_core::frames::InboundFrame;

use super::{decode_frame, FrameSender, FrameSource, Outgoing, TransportError};

/// Close reasons are limited to 123 bytes by the WebSocket protocol.
const MAX_CLOSE_REASON: usize = 123;

/// Split a socket into the session's halves. The writer runs as its own task
/// fed by a queue of `max_send_queue` messages and pings every `heartbeat`.
pub fn split(
    socket: WebSocket,
    max_send_queue: usize,
    heartbeat: Duration,
) -> (FrameSender, WsSource, JoinHandle<()>) {
    let (ws_tx, ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel(max_send_queue);
    let writer = tokio::spawn(write_loop(ws_tx, rx, heartbeat));
    (FrameSender::new(tx), WsSource { rx: ws_rx }, writer)
}

/// Forward queued messages to the socket, with periodic ping. Ends after a
/// close is written, when every sender is dropped, or on a write error.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Outgoing>,
    heartbeat: Duration,
) {
    let mut ping_interval = tokio::time::interval(heartbeat);
    ping_interval.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    Outgoing::Frame(frame) => {
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::error!(kind = frame.kind(), error = %e, "failed to encode frame");
                                continue;
                            }
                        };
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            tracing::debug!("socket write failed, stopping writer");
                            break;
                        }
                    }
                    Outgoing::Close { code, reason } => {
                        let frame = CloseFrame {
                            code,
                            reason: truncate_reason(&reason).into(),
                        };
                        let _ = ws_tx.send(WsMessage::Close(Some(frame))).await;
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                tracing::trace!("sent ping");
            }
        }
    }

    let _ = ws_tx.close().await;
}

fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

/// Inbound half of a WebSocket session.
pub struct WsSource {
    rx: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Result<Option<InboundFrame>, TransportError> {
        while let Some(msg) = self.rx.next().await {
            let msg = msg.map_err(|e| TransportError::Read(e.to_string()))?;
            match msg {
                WsMessage::Text(text) => return decode_frame(text.as_str()).map(Some),
                WsMessage::Binary(bytes) => {
                    return serde_json::from_slice(&bytes)
                        .map(Some)
                        .map_err(|e| TransportError::Decode(e.to_string()));
                }
                WsMessage::Close(_) => return Ok(None),
                WsMessage::Ping(_) | WsMessage::Pong(_) => {} // axum answers pings itself
            }
        }
        Ok(None)
    }
}
