use thiserror::Error;
use warp::{reject::Reject, Reply, Rejection};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Handler failure: {0}")]
    HandlerFailure(String),

    #[error("Request {0} is already awaiting a reply")]
    DuplicateRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out waiting for a reply from {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedMessage(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Protocol(other),
        }
    }
}

impl Reject for ApiError {}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(api_err) = err.find::<ApiError>() {
        let (code, message) = match api_err {
            ApiError::BadRequest(_) => (400, "Bad request"),
            ApiError::NotFound(_) => (404, "Resource not found"),
            ApiError::Timeout(_) => (504, "Request timed out"),
            ApiError::Protocol(ProtocolError::Transport(_)) => (502, "Peer unreachable"),
            _ => (500, "Internal server error"),
        };

        let json = warp::reply::json(&serde_json::json!({
            "error": message,
            "details": api_err.to_string(),
        }));

        let status = warp::http::StatusCode::from_u16(code)
            .unwrap_or(warp::http::StatusCode::INTERNAL_SERVER_ERROR);
        Ok(warp::reply::with_status(json, status))
    } else if let Some(body_err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        let json = warp::reply::json(&serde_json::json!({
            "error": "Bad request",
            "details": body_err.to_string(),
        }));
        Ok(warp::reply::with_status(json, warp::http::StatusCode::BAD_REQUEST))
    } else {
        Err(err)
    }
}
