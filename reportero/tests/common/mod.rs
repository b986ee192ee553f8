#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use reportero::api::AppState;
use reportero::metrics::Metrics;
use reportero::protocol::{AgentDirectory, AgentInfo, Capability, Envelope, Payload, ProtocolEngine};
use reportero::transport::{ChannelTransport, PeerRouter};

pub fn identity(agent_id: &str) -> AgentInfo {
    AgentInfo::new(
        agent_id,
        agent_id.to_uppercase(),
        vec![Capability::TaskExecution],
        format!("agent://{}", agent_id),
    )
}

pub fn params(value: Value) -> Payload {
    value.as_object().cloned().expect("params must be a JSON object")
}

/// An engine whose outbound traffic lands on `outbox`.
pub struct Node {
    pub engine: Arc<ProtocolEngine>,
    pub outbox: UnboundedReceiver<Envelope>,
}

pub fn node(agent_id: &str) -> Node {
    let (transport, outbox) = ChannelTransport::new();
    Node {
        engine: Arc::new(ProtocolEngine::new(identity(agent_id), Arc::new(transport))),
        outbox,
    }
}

/// Server state backed by a private metrics registry.
pub fn app_state(agent_id: &str) -> AppState {
    let directory = AgentDirectory::new();
    let router = PeerRouter::new(directory.clone(), Duration::from_secs(2)).unwrap();
    let engine = Arc::new(ProtocolEngine::with_directory(
        identity(agent_id),
        directory,
        Arc::new(router.clone()),
    ));

    AppState {
        engine,
        router,
        metrics: Metrics::register(&Registry::new()).unwrap(),
        request_timeout: Duration::from_secs(5),
    }
}
