use serde::{Deserialize, Serialize};

use crate::protocol::{Capability, Payload};

// News workflow models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub source: String,
}

impl From<&NewsItem> for SourceRef {
    fn from(item: &NewsItem) -> Self {
        Self {
            title: item.title.clone(),
            url: item.url.clone(),
            source: item.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub email_to: Option<String>,
}

impl WorkflowParams {
    /// `query` wins over `topic`; blank values count as missing.
    pub fn query(&self) -> Option<&str> {
        [self.query.as_deref(), self.topic.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|q| !q.is_empty())
    }

    pub fn email_to(&self) -> Option<&str> {
        self.email_to.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub query: String,
    pub status: String,
    pub summary: String,
    pub sources: Vec<SourceRef>,
    pub emailed: bool,
}

// API Request/Response models
#[derive(Debug, Deserialize)]
pub struct OutboundRequest {
    pub receiver_id: String,
    pub action: String,
    #[serde(default)]
    pub params: Payload,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AgentQuery {
    pub capability: Option<Capability>,
}

#[derive(Debug, Serialize)]
pub struct ProcessedReply {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub message: String,
    pub agent_id: String,
    pub actions: Vec<String>,
    pub connected_peers: Vec<String>,
}
