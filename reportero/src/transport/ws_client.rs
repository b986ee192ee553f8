// Outbound WebSocket links to peers listed in the configuration

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use super::{handle_frame, PeerRouter};
use crate::protocol::{Envelope, ProtocolEngine};

/// Connect to `<base_url>/ws/<own id>` and route traffic for `peer_id` over
/// the socket until it closes. The returned task ends with the connection.
pub async fn dial(
    base_url: &str,
    peer_id: &str,
    engine: Arc<ProtocolEngine>,
    router: PeerRouter,
) -> Result<JoinHandle<()>> {
    let url = format!("{}/ws/{}", base_url.trim_end_matches('/'), engine.agent_id());
    let (stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect to peer {} at {}", peer_id, url))?;
    info!("Connected to peer {} at {}", peer_id, url);

    let (mut sink, mut source) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    router.connect(peer_id, tx.clone()).await;

    let writer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match envelope.to_json() {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Could not encode {}: {}", envelope.message_id(), e),
            }
        }
    });

    let peer_id = peer_id.to_string();
    Ok(tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    handle_frame(&engine, &peer_id, &text, &tx);
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error from {}: {}", peer_id, e);
                    break;
                }
            }
        }

        router.disconnect(&peer_id, &tx).await;
        writer.abort();
        info!("Link to peer {} closed", peer_id);
    }))
}
