// Protocol Engine: builds outbound messages, dispatches inbound ones and
// correlates replies with the requests waiting on them

use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::correlation::CorrelationTable;
use super::directory::{AgentDirectory, AgentInfo, Capability};
use super::handlers::HandlerRegistry;
use super::message::{error_payload, request_payload, response_payload, Envelope, MessageKind, Payload};
use crate::error::ProtocolError;
use crate::transport::Transport;

const NOTIFICATION_BUFFER: usize = 64;

/// What a caller of [`ProtocolEngine::request_and_wait`] observes.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The peer answered; the payload carries `success` plus `result` or `error`.
    Resolved(Payload),
    TimedOut,
}

impl RequestOutcome {
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            RequestOutcome::Resolved(payload) => Some(payload),
            RequestOutcome::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, RequestOutcome::TimedOut)
    }
}

pub struct ProtocolEngine {
    identity: AgentInfo,
    directory: AgentDirectory,
    handlers: HandlerRegistry,
    pending: CorrelationTable,
    transport: Arc<dyn Transport>,
    notifications: broadcast::Sender<Envelope>,
}

impl ProtocolEngine {
    pub fn new(identity: AgentInfo, transport: Arc<dyn Transport>) -> Self {
        Self::with_directory(identity, AgentDirectory::new(), transport)
    }

    /// Build an engine around an existing directory, for transports that
    /// need to look peers up themselves.
    pub fn with_directory(
        identity: AgentInfo,
        directory: AgentDirectory,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            identity,
            directory,
            handlers: HandlerRegistry::new(),
            pending: CorrelationTable::new(),
            transport,
            notifications,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.identity.agent_id
    }

    pub fn self_info(&self) -> AgentInfo {
        self.identity.clone()
    }

    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    pub fn register_agent(&self, agent: AgentInfo) {
        self.directory.register_agent(agent);
    }

    pub fn find_by_capability(&self, capability: Capability) -> Vec<AgentInfo> {
        self.directory.find_by_capability(capability)
    }

    pub fn register_handler<F, Fut>(&self, action: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.handlers.register(action, handler);
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, message_id: &str) -> bool {
        self.pending.contains(message_id)
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Envelope> {
        self.notifications.subscribe()
    }

    /// Build an envelope stamped with this agent's id. No I/O happens here;
    /// the caller hands the result to a transport.
    pub fn send(
        &self,
        receiver_id: Option<&str>,
        kind: MessageKind,
        payload: Payload,
        in_reply_to: Option<&str>,
    ) -> Result<Envelope, ProtocolError> {
        let message = Envelope::build(
            kind,
            self.agent_id(),
            receiver_id.map(str::to_string),
            payload,
            in_reply_to.map(str::to_string),
        )?;

        info!(
            "Sending {} message to {}: {}",
            kind,
            receiver_id.unwrap_or("broadcast"),
            message.action().unwrap_or("unknown")
        );
        Ok(message)
    }

    /// Hand an envelope to the transport. A reply the transport returns
    /// synchronously is processed like any other inbound reply.
    pub async fn transmit(&self, envelope: Envelope) -> Result<(), ProtocolError> {
        let Some(answer) = self.transport.transmit(envelope).await? else {
            return Ok(());
        };

        if answer.kind().is_reply() {
            if let Some(unexpected) = self.handle_message(answer).await {
                warn!(
                    "Dropping {} produced for a synchronous reply {}",
                    unexpected.kind(),
                    unexpected.message_id()
                );
            }
        } else {
            warn!(
                "Ignoring {} from {} returned over a synchronous transport",
                answer.kind(),
                answer.sender_id()
            );
        }
        Ok(())
    }

    pub async fn notify(
        &self,
        receiver_id: Option<&str>,
        payload: Payload,
    ) -> Result<Envelope, ProtocolError> {
        let message = self.send(receiver_id, MessageKind::Notification, payload, None)?;
        self.transmit(message.clone()).await?;
        Ok(message)
    }

    /// Send a request and suspend until its reply arrives or `timeout` passes.
    pub async fn request_and_wait(
        &self,
        receiver_id: &str,
        action: &str,
        params: Payload,
        timeout: Duration,
    ) -> Result<RequestOutcome, ProtocolError> {
        let message = self.send(
            Some(receiver_id),
            MessageKind::Request,
            request_payload(action, params),
            None,
        )?;

        let deadline = Instant::now() + timeout;

        // Registered before transmitting so a fast reply cannot slip past.
        let pending = self.pending.register(message.message_id())?;

        // The deadline covers the transmit too: synchronous transports only
        // return once the peer has run its handler. On failure `pending` is
        // dropped here, which frees the slot.
        match tokio::time::timeout_at(deadline, self.transmit(message)).await {
            Ok(sent) => sent?,
            Err(_) => warn!("Transmit to {} outlived the request deadline", receiver_id),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match pending.wait(remaining).await {
            Some(reply) => Ok(RequestOutcome::Resolved(reply.into_payload())),
            None => {
                error!("Timeout waiting for response from {}", receiver_id);
                Ok(RequestOutcome::TimedOut)
            }
        }
    }

    /// Process one inbound envelope, returning the reply to send back (if any).
    pub async fn handle_message(&self, message: Envelope) -> Option<Envelope> {
        info!(
            "Received {} from {}: {}",
            message.kind(),
            message.sender_id(),
            message.action().unwrap_or("unknown")
        );

        let message = match self.pending.resolve(message) {
            Ok(()) => return None,
            Err(message) => message,
        };

        match message.kind() {
            MessageKind::Request => self.dispatch(&message).await,
            MessageKind::Response | MessageKind::Error => {
                warn!(
                    "Dropping {} from {}: no pending request {}",
                    message.kind(),
                    message.sender_id(),
                    message.in_reply_to().unwrap_or("-")
                );
                None
            }
            MessageKind::Notification => {
                if self.notifications.send(message).is_err() {
                    debug!("No notification subscribers");
                }
                None
            }
        }
    }

    async fn dispatch(&self, request: &Envelope) -> Option<Envelope> {
        let action = request.action().unwrap_or_default();

        let payload = match self.handlers.lookup(action) {
            Some(handler) => {
                match AssertUnwindSafe(handler(request.params())).catch_unwind().await {
                    Ok(Ok(result)) => Ok(response_payload(result)),
                    Ok(Err(e)) => {
                        error!("Error handling action {}: {:#}", action, e);
                        Err(error_payload(
                            ProtocolError::HandlerFailure(format!("{:#}", e)).to_string(),
                        ))
                    }
                    Err(_) => {
                        error!("Handler for action {} panicked", action);
                        Err(error_payload(
                            ProtocolError::HandlerFailure(format!("handler for '{}' panicked", action))
                                .to_string(),
                        ))
                    }
                }
            }
            None => {
                warn!("No handler for action: {}", action);
                Err(error_payload(
                    ProtocolError::UnknownAction(action.to_string()).to_string(),
                ))
            }
        };

        let (kind, payload) = match payload {
            Ok(payload) => (MessageKind::Response, payload),
            Err(payload) => (MessageKind::Error, payload),
        };

        self.reply(request, kind, payload)
    }

    fn reply(&self, request: &Envelope, kind: MessageKind, payload: Payload) -> Option<Envelope> {
        self.send(
            Some(request.sender_id()),
            kind,
            payload,
            Some(request.message_id()),
        )
        .map_err(|e| error!("Could not build reply to {}: {}", request.message_id(), e))
        .ok()
    }
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("identity", &self.identity)
            .field("handlers", &self.handlers)
            .field("pending", &self.pending)
            .finish()
    }
}
