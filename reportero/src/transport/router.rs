// Peer Router: delivers envelopes over live WebSockets, falling back to the
// peer's HTTP endpoint from the directory

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use super::Transport;
use crate::error::ProtocolError;
use crate::protocol::{AgentDirectory, Envelope};

pub type Outbound = mpsc::UnboundedSender<Envelope>;

#[derive(Clone)]
pub struct PeerRouter {
    connections: Arc<RwLock<HashMap<String, Outbound>>>,
    directory: AgentDirectory,
    client: reqwest::Client,
}

impl PeerRouter {
    pub fn new(directory: AgentDirectory, http_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(http_timeout).build()?;
        Ok(Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            directory,
            client,
        })
    }

    pub async fn connect(&self, agent_id: &str, outbound: Outbound) {
        info!("Agent {} connected via WebSocket", agent_id);
        self.connections
            .write()
            .await
            .insert(agent_id.to_string(), outbound);
    }

    /// Forget the connection, unless the agent has since reconnected on a
    /// different socket.
    pub async fn disconnect(&self, agent_id: &str, outbound: &Outbound) {
        let mut connections = self.connections.write().await;
        if connections
            .get(agent_id)
            .is_some_and(|current| current.same_channel(outbound))
        {
            connections.remove(agent_id);
            info!("Agent {} disconnected", agent_id);
        }
    }

    pub async fn is_connected(&self, agent_id: &str) -> bool {
        self.connections.read().await.contains_key(agent_id)
    }

    pub async fn connected(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn deliver(&self, agent_id: &str, envelope: Envelope) -> Result<Option<Envelope>, ProtocolError> {
        let outbound = self.connections.read().await.get(agent_id).cloned();
        if let Some(outbound) = outbound {
            if outbound.send(envelope.clone()).is_ok() {
                return Ok(None);
            }
            warn!("WebSocket to {} is closed, trying HTTP", agent_id);
        }

        let endpoint = self
            .directory
            .get(agent_id)
            .and_then(|agent| agent.http_endpoint().map(str::to_string));
        match endpoint {
            Some(endpoint) => self.post(&endpoint, &envelope).await,
            None => Err(ProtocolError::Transport(format!(
                "no route to agent {}",
                agent_id
            ))),
        }
    }

    async fn post(&self, endpoint: &str, envelope: &Envelope) -> Result<Option<Envelope>, ProtocolError> {
        let url = format!("{}/message", endpoint);
        let resp = self
            .client
            .post(&url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProtocolError::Transport(format!(
                "{} answered {}: {}",
                url, status, body
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;
        if body.get("message_id").is_none() {
            return Ok(None);
        }

        match Envelope::from_value(body) {
            Ok(answer) => Ok(Some(answer)),
            Err(e) => {
                warn!("Discarding malformed answer from {}: {}", url, e);
                Ok(None)
            }
        }
    }

    async fn broadcast(&self, envelope: Envelope) {
        let connections: Vec<(String, Outbound)> = self
            .connections
            .read()
            .await
            .iter()
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect();

        for (agent_id, outbound) in &connections {
            if outbound.send(envelope.clone()).is_err() {
                warn!("Broadcast to {} failed: WebSocket closed", agent_id);
            }
        }

        for agent in self.directory.snapshot() {
            if connections.iter().any(|(id, _)| *id == agent.agent_id) {
                continue;
            }
            let Some(endpoint) = agent.http_endpoint() else {
                continue;
            };
            if let Err(e) = self.post(endpoint, &envelope).await {
                warn!("Broadcast to {} failed: {}", agent.agent_id, e);
            }
        }
    }
}

#[async_trait]
impl Transport for PeerRouter {
    async fn transmit(&self, envelope: Envelope) -> Result<Option<Envelope>, ProtocolError> {
        match envelope.receiver_id().map(str::to_string) {
            Some(agent_id) => self.deliver(&agent_id, envelope).await,
            None => {
                self.broadcast(envelope).await;
                Ok(None)
            }
        }
    }
}
