use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::BridgeError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub enum ApiError {
    Validation(String),
    NotFound(String),
    Busy(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Busy(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::InvalidSignal(_) => Self::Validation(e.to_string()),
            BridgeError::SymbolBusy(_) => Self::Busy(e.to_string()),
            // Disabled strategies are acknowledged with 200 upstream; reaching
            // here means a caller skipped that mapping.
            BridgeError::StrategyDisabled(_)
            | BridgeError::Connectivity(_)
            | BridgeError::VenueRejected { .. }
            | BridgeError::Configuration(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
