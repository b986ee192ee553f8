use std::sync::Arc;
use std::time::Duration;
use warp::{Filter, Rejection, Reply};

use crate::error::handle_rejection;
use crate::metrics::Metrics;
use crate::middleware;
use crate::protocol::ProtocolEngine;
use crate::transport::PeerRouter;

mod agents;
mod messages;
mod ws;

/// Everything the HTTP and WebSocket handlers share.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProtocolEngine>,
    pub router: PeerRouter,
    pub metrics: Metrics,
    pub request_timeout: Duration,
}

/// The full HTTP surface: routes, error recovery, request logging and CORS.
pub fn service(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    routes(state)
        .recover(handle_rejection)
        .with(warp::log("api"))
        .with(middleware::cors())
}

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let root_route = warp::path::end()
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(agents::handle_root);

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(messages::handle_metrics);

    let info_route = warp::path("info")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(agents::handle_info);

    let list_agents_route = warp::path("agents")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(agents::handle_list_agents);

    let get_agent_route = warp::path!("agents" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(agents::handle_get_agent);

    let register_agent_route = warp::path("agents")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(agents::handle_register_agent);

    let message_route = warp::path("message")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(messages::handle_message);

    let request_route = warp::path("request")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(messages::handle_request);

    let ws_route = warp::path("ws")
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_state(state))
        .map(|agent_id: String, upgrade: warp::ws::Ws, state: AppState| {
            upgrade.on_upgrade(move |socket| ws::serve(socket, agent_id, state))
        });

    root_route
        .or(health_route)
        .or(metrics_route)
        .or(info_route)
        .or(list_agents_route)
        .or(get_agent_route)
        .or(register_agent_route)
        .or(message_route)
        .or(request_route)
        .or(ws_route)
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}
