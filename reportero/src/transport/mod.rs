// Transports physically move envelopes between agents

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::ProtocolError;
use crate::protocol::{Envelope, MessageKind, ProtocolEngine};

pub mod router;
pub mod ws_client;

pub use router::{Outbound, PeerRouter};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `envelope`. Transports with request/response semantics (HTTP)
    /// return the peer's answer when it is itself an envelope.
    async fn transmit(&self, envelope: Envelope) -> Result<Option<Envelope>, ProtocolError>;
}

/// In-process transport: every transmitted envelope lands on a channel.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn transmit(&self, envelope: Envelope) -> Result<Option<Envelope>, ProtocolError> {
        self.tx
            .send(envelope)
            .map_err(|_| ProtocolError::Transport("channel closed".to_string()))?;
        Ok(None)
    }
}

/// Decode one text frame from a connected peer and handle it on its own
/// task; any reply is queued back on `outbound`. Malformed frames are logged
/// and skipped, yielding `None`.
pub fn handle_frame(
    engine: &Arc<ProtocolEngine>,
    peer_id: &str,
    text: &str,
    outbound: &Outbound,
) -> Option<MessageKind> {
    let message = match Envelope::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Skipping frame from {}: {}", peer_id, e);
            return None;
        }
    };
    let kind = message.kind();

    let engine = engine.clone();
    let outbound = outbound.clone();
    tokio::spawn(async move {
        if let Some(reply) = engine.handle_message(message).await {
            if outbound.send(reply).is_err() {
                warn!("Connection closed before reply could be sent");
            }
        }
    });
    Some(kind)
}
