use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};
use warp::{Rejection, Reply};

use super::AppState;
use crate::error::ApiError;
use crate::models::{OutboundRequest, ProcessedReply};
use crate::protocol::{Envelope, RequestOutcome};

pub async fn handle_message(body: Value, state: AppState) -> Result<impl Reply, Rejection> {
    let message = Envelope::from_value(body).map_err(|e| {
        error!("Error processing message: {}", e);
        warp::reject::custom(ApiError::from(e))
    })?;
    state.metrics.message_received(message.kind(), "http");

    match state.engine.handle_message(message).await {
        Some(reply) => Ok(warp::reply::json(&reply)),
        None => Ok(warp::reply::json(&ProcessedReply { status: "processed" })),
    }
}

pub async fn handle_request(request: OutboundRequest, state: AppState) -> Result<impl Reply, Rejection> {
    let timeout = match request.timeout_secs {
        None => state.request_timeout,
        Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
        Some(secs) => {
            return Err(warp::reject::custom(ApiError::BadRequest(format!(
                "timeout_secs must be positive, got {}",
                secs
            ))))
        }
    };
    info!(
        "Requesting {} from {} (timeout {:?})",
        request.action, request.receiver_id, timeout
    );

    let outcome = state
        .engine
        .request_and_wait(&request.receiver_id, &request.action, request.params, timeout)
        .await
        .map_err(|e| warp::reject::custom(ApiError::from(e)))?;

    match outcome {
        RequestOutcome::Resolved(payload) => {
            state.metrics.request_finished("resolved");
            Ok(warp::reply::json(&payload))
        }
        RequestOutcome::TimedOut => {
            state.metrics.request_finished("timed_out");
            Err(warp::reject::custom(ApiError::Timeout(request.receiver_id)))
        }
    }
}

pub async fn handle_metrics(state: AppState) -> Result<impl Reply, Rejection> {
    let (body, content_type) = state
        .metrics
        .render(state.engine.pending_count())
        .map_err(|e| warp::reject::custom(ApiError::InternalError(e.to_string())))?;
    Ok(warp::reply::with_header(body, "Content-Type", content_type))
}
