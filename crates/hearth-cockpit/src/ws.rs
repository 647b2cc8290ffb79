//! WebSocket viewer sessions.
//!
//! A session registers with the core right after the handshake, so its first
//! frame is always the `deviceState` snapshot. From then on it forwards every
//! queued frame downstream and feeds `deviceCommand` frames from the viewer
//! into the same write path as `POST /api/devices/...`.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use hearth_kernel::{BridgeCore, ViewerId, WriteAck};
use hearth_types::{HearthError, ViewerEvent};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Frames a viewer may send upstream.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum UpstreamFrame {
    DeviceCommand(DeviceCommand),
}

#[derive(Debug, Deserialize)]
struct DeviceCommand {
    category: String,
    device: String,
    state: Value,
}

pub(crate) async fn handle_viewer<S>(
    stream: S,
    peer: SocketAddr,
    core: Arc<BridgeCore>,
) -> Result<(), HearthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| HearthError::Io(format!("WebSocket handshake from {peer}: {e}")))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let mut subscription = core.connect_viewer();
    let id = subscription.id();
    info!(%peer, viewer = %id, viewers = core.viewer_count(), "viewer connected");

    loop {
        tokio::select! {
            // ── Downstream: core → viewer ───────────────────────────────────
            frame = subscription.recv() => {
                let Some(frame) = frame else {
                    // Evicted by the hub.
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                match serde_json::to_string(frame.as_ref()) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(viewer = %id, error = %e, "frame serialization failed"),
                }
            }
            // ── Upstream: viewer → core ─────────────────────────────────────
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_upstream_message(text.as_str(), &core, id);
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                _ => {}
            },
        }
    }

    core.disconnect_viewer(id);
    info!(%peer, viewer = %id, "viewer disconnected");
    Ok(())
}

/// Apply one upstream frame from viewer `id`.
///
/// Returns `None` for frames that are not commands (ignored). A rejected
/// command is answered with a `commandError` frame to that viewer only.
pub(crate) fn handle_upstream_message(
    text: &str,
    core: &BridgeCore,
    id: ViewerId,
) -> Option<Result<WriteAck, HearthError>> {
    let frame = match serde_json::from_str::<UpstreamFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(viewer = %id, error = %e, "ignoring upstream frame");
            return None;
        }
    };
    let UpstreamFrame::DeviceCommand(command) = frame;
    let result = core.apply_write(&command.category, &command.device, &command.state);
    if let Err(e) = &result {
        core.notify_viewer(
            id,
            ViewerEvent::CommandError {
                error: e.api_message(),
            },
        );
    }
    Some(result)
}
