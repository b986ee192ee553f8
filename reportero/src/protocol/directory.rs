// Agent Directory: known peers and what they can do

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    DataRetrieval,
    DataAnalysis,
    TaskExecution,
    Reasoning,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::DataRetrieval => "data_retrieval",
            Capability::DataAnalysis => "data_analysis",
            Capability::TaskExecution => "task_execution",
            Capability::Reasoning => "reasoning",
        }
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "data_retrieval" => Ok(Capability::DataRetrieval),
            "data_analysis" => Ok(Capability::DataAnalysis),
            "task_execution" => Ok(Capability::TaskExecution),
            "reasoning" => Ok(Capability::Reasoning),
            other => Err(format!("unknown capability '{}'", other)),
        }
    }
}

fn default_status() -> String {
    "active".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub endpoint: String,
    #[serde(default = "default_status")]
    pub status: String,
}

impl AgentInfo {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        capabilities: Vec<Capability>,
        endpoint: impl Into<String>,
    ) -> Self {
        let mut deduped: Vec<Capability> = Vec::with_capacity(capabilities.len());
        for cap in capabilities {
            if !deduped.contains(&cap) {
                deduped.push(cap);
            }
        }

        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            capabilities: deduped,
            endpoint: endpoint.into(),
            status: default_status(),
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Base URL when the agent is reachable over HTTP.
    pub fn http_endpoint(&self) -> Option<&str> {
        let endpoint = self.endpoint.trim_end_matches('/');
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Some(endpoint)
        } else {
            None
        }
    }
}

/// In-memory registry of peer agents. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct AgentDirectory {
    entries: Arc<RwLock<Vec<AgentInfo>>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert by agent id. A re-registered agent keeps its original slot.
    pub fn register_agent(&self, agent: AgentInfo) {
        info!("Registered agent: {} ({})", agent.name, agent.agent_id);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|a| a.agent_id == agent.agent_id) {
            Some(existing) => *existing = agent,
            None => entries.push(agent),
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentInfo> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().find(|a| a.agent_id == agent_id).cloned()
    }

    pub fn find_by_capability(&self, capability: Capability) -> Vec<AgentInfo> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|a| a.has_capability(capability))
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<AgentInfo> {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, caps: Vec<Capability>) -> AgentInfo {
        AgentInfo::new(id, id.to_uppercase(), caps, format!("agent://{}", id))
    }

    #[test]
    fn capability_filter_keeps_registration_order() {
        let directory = AgentDirectory::new();
        directory.register_agent(agent("first", vec![Capability::DataRetrieval]));
        directory.register_agent(agent("second", vec![Capability::DataAnalysis]));
        directory.register_agent(agent(
            "third",
            vec![Capability::DataRetrieval, Capability::DataAnalysis],
        ));

        let ids: Vec<String> = directory
            .find_by_capability(Capability::DataRetrieval)
            .into_iter()
            .map(|a| a.agent_id)
            .collect();
        assert_eq!(ids, vec!["first", "third"]);
        assert!(directory.find_by_capability(Capability::Reasoning).is_empty());
    }

    #[test]
    fn re_registration_overwrites_entry() {
        let directory = AgentDirectory::new();
        directory.register_agent(agent("peer", vec![Capability::DataRetrieval]));
        let mut updated = agent("peer", vec![Capability::Reasoning]);
        updated.status = "busy".to_string();
        directory.register_agent(updated);

        assert_eq!(directory.len(), 1);
        let stored = directory.get("peer").unwrap();
        assert_eq!(stored.status, "busy");
        assert!(directory.find_by_capability(Capability::DataRetrieval).is_empty());
    }

    #[test]
    fn status_defaults_to_active_on_the_wire() {
        let info: AgentInfo = serde_json::from_value(serde_json::json!({
            "agent_id": "peer",
            "name": "Peer",
            "capabilities": ["reasoning", "data_analysis"],
            "endpoint": "http://peer:8000/"
        }))
        .unwrap();
        assert_eq!(info.status, "active");
        assert_eq!(info.http_endpoint(), Some("http://peer:8000"));
        assert_eq!("reasoning".parse::<Capability>(), Ok(Capability::Reasoning));
        assert!("telepathy".parse::<Capability>().is_err());
    }
}
