use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chronowheel_types::IngressError;
use serde::Serialize;

/// Error surfaced to HTTP callers. Delivery-side failures never reach
/// here; only validation and ingest-unavailability are exposed (§7).
pub enum ApiError {
    Validation(&'static str),
    QueueUnavailable(String),
    ShuttingDown,
}

impl From<IngressError> for ApiError {
    fn from(err: IngressError) -> Self {
        match err {
            IngressError::InvalidCallbackUrl(_) => ApiError::Validation("invalid_url"),
            IngressError::NegativeDelay => ApiError::Validation("delay_negative"),
            IngressError::DelayTooLarge(_, _) => ApiError::Validation("delay_too_large"),
            IngressError::PayloadTooLarge(_) => ApiError::Validation("payload_too_large"),
            IngressError::QueueUnavailable(e) => ApiError::QueueUnavailable(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = match self {
            ApiError::Validation(reason) => (StatusCode::BAD_REQUEST, reason.to_string()),
            ApiError::QueueUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "shutting down".to_string(),
            ),
        };
        (status, Json(ErrorBody { error: reason })).into_response()
    }
}
