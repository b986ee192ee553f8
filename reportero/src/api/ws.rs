use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::warn;
use warp::ws::{Message, WebSocket};

use super::AppState;
use crate::protocol::Envelope;
use crate::transport::handle_frame;

/// Serve one peer connected on `/ws/<agent_id>` until it disconnects.
pub async fn serve(socket: WebSocket, agent_id: String, state: AppState) {
    let (mut sink, mut source) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    state.router.connect(&agent_id, tx.clone()).await;

    let writer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match envelope.to_json() {
                Ok(text) => {
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Could not encode {}: {}", envelope.message_id(), e),
            }
        }
    });

    while let Some(frame) = source.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        };

        if msg.is_close() {
            break;
        }
        let Ok(text) = msg.to_str() else {
            continue;
        };
        if let Some(kind) = handle_frame(&state.engine, &agent_id, text, &tx) {
            state.metrics.message_received(kind, "ws");
        }
    }

    state.router.disconnect(&agent_id, &tx).await;
    writer.abort();
}
