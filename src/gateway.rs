//! Websocket transport to the realtime gateway.
//!
//! Every text frame in either direction is a JSON [`Frame`]. Outbound frames
//! are queued on an unbounded channel so that [`GatewayHandle::emit`] can be
//! called from synchronous code (including `Drop`). Inbound `group:event`
//! frames are decoded into [`GroupEvent`]s; everything else is ignored.

use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::realtime::{Frame, GroupEvent, RealtimeChannel, GROUP_EVENT};

#[derive(Debug)]
pub enum GatewayError {
    WebSocket(tokio_tungstenite::tungstenite::Error),
    Serde(serde_json::Error),
    /// The connection's writer task has stopped.
    Closed,
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::WebSocket(e) => write!(f, "websocket error: {e}"),
            GatewayError::Serde(e) => write!(f, "serialization error: {e}"),
            GatewayError::Closed => write!(f, "gateway connection closed"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::WebSocket(e)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serde(e)
    }
}

/// Cloneable sender for outbound frames. The connection closes once every
/// handle is dropped and the queued frames are flushed.
#[derive(Clone)]
pub struct GatewayHandle {
    outbound: mpsc::UnboundedSender<Frame>,
}

impl GatewayHandle {
    pub fn send(&self, frame: Frame) -> Result<(), GatewayError> {
        self.outbound.send(frame).map_err(|_| GatewayError::Closed)
    }
}

impl RealtimeChannel for GatewayHandle {
    fn emit(&self, event: &str, payload: Value) {
        let frame = Frame {
            event: event.to_string(),
            data: payload,
        };
        if let Err(e) = self.send(frame) {
            crate::rlog!("gateway: dropped outbound {}: {}", event, e);
        }
    }
}

/// A live gateway connection.
pub struct GatewayConnection {
    pub handle: GatewayHandle,
    pub events: mpsc::UnboundedReceiver<GroupEvent>,
    writer: JoinHandle<()>,
}

impl GatewayConnection {
    /// Flush every queued frame and close the socket. Other clones of
    /// [`GatewayHandle`] must already be dropped, otherwise this waits for
    /// them.
    pub async fn close(self) {
        drop(self.handle);
        drop(self.events);
        if let Err(e) = self.writer.await {
            crate::rlog!("gateway: writer task failed: {}", e);
        }
    }
}

/// Connect to `url` and start the reader and writer tasks.
pub async fn connect(url: &str) -> Result<GatewayConnection, GatewayError> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
    crate::rlog!("gateway connected: {}", url);

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    crate::rlog!("gateway: could not encode {}: {}", frame.event, e);
                    continue;
                }
            };
            if let Err(e) = write.send(WsMessage::Text(text)).await {
                crate::rlog!("gateway: send failed: {}", e);
                return;
            }
        }
        let _ = write.close().await;
    });

    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => {
                    if let Some(event) = decode_group_event(&text) {
                        if events_tx.send(event).is_err() {
                            break;
                        }
                    }
                }
                Ok(WsMessage::Close(_)) => break,
                Err(e) => {
                    crate::rlog!("gateway error: {}", e);
                    break;
                }
                _ => {}
            }
        }
        crate::rlog!("gateway disconnected");
    });

    Ok(GatewayConnection {
        handle: GatewayHandle {
            outbound: outbound_tx,
        },
        events: events_rx,
        writer,
    })
}

/// Decode a text frame, keeping only `group:event` payloads.
pub fn decode_group_event(text: &str) -> Option<GroupEvent> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            crate::rlog!("gateway: ignoring unparsable frame: {}", e);
            return None;
        }
    };
    if frame.event != GROUP_EVENT {
        return None;
    }
    match serde_json::from_value(frame.data) {
        Ok(event) => Some(event),
        Err(e) => {
            crate::rlog!("gateway: ignoring malformed {} payload: {}", GROUP_EVENT, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_group_event() {
        let event =
            decode_group_event(r#"{"event":"group:event","data":{"event":"group:deleted"}}"#)
                .unwrap();
        assert_eq!(event.event, "group:deleted");
    }

    #[test]
    fn test_decode_ignores_other_frames() {
        assert!(decode_group_event(r#"{"event":"presence","data":{}}"#).is_none());
        assert!(decode_group_event("not json").is_none());
        assert!(decode_group_event(r#"{"event":"group:event","data":42}"#).is_none());
    }

    #[test]
    fn test_emit_on_closed_handle_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = GatewayHandle { outbound: tx };
        handle.emit("groups:leave", serde_json::json!({ "code": "ABC" }));
        assert!(matches!(
            handle.send(Frame {
                event: "x".to_string(),
                data: Value::Null,
            }),
            Err(GatewayError::Closed)
        ));
    }
}
