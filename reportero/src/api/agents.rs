use tracing::info;
use warp::{Rejection, Reply};

use super::AppState;
use crate::error::ApiError;
use crate::models::{AgentQuery, ServerInfo};
use crate::protocol::AgentInfo;

pub async fn handle_root(state: AppState) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&ServerInfo {
        message: "Welcome to the A2A Server".to_string(),
        agent_id: state.engine.agent_id().to_string(),
        actions: state.engine.handlers().actions(),
        connected_peers: state.router.connected().await,
    }))
}

pub async fn handle_info(state: AppState) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.engine.self_info()))
}

pub async fn handle_list_agents(query: AgentQuery, state: AppState) -> Result<impl Reply, Rejection> {
    let agents = match query.capability {
        Some(capability) => state.engine.find_by_capability(capability),
        None => state.engine.directory().snapshot(),
    };
    Ok(warp::reply::json(&agents))
}

pub async fn handle_get_agent(agent_id: String, state: AppState) -> Result<impl Reply, Rejection> {
    let agent = state
        .engine
        .directory()
        .get(&agent_id)
        .ok_or_else(|| warp::reject::custom(ApiError::NotFound(format!("agent {}", agent_id))))?;
    Ok(warp::reply::json(&agent))
}

pub async fn handle_register_agent(agent: AgentInfo, state: AppState) -> Result<impl Reply, Rejection> {
    info!("Registering agent {} via HTTP", agent.agent_id);
    state.engine.register_agent(agent.clone());
    Ok(warp::reply::json(&agent))
}
