//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Internal(msg) => msg,
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<conveyor_core::Error> for ApiError {
    fn from(err: conveyor_core::Error) -> Self {
        match err {
            conveyor_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            conveyor_core::Error::QueueClosed
            | conveyor_core::Error::Cancelled
            | conveyor_core::Error::Timeout(_) => ApiError::ServiceUnavailable(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::Error;

    #[test]
    fn test_core_errors_map_to_status_codes() {
        let cases = [
            (
                Error::InvalidInput("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (Error::QueueClosed, StatusCode::SERVICE_UNAVAILABLE),
            (
                Error::Queue("redis down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, want) in cases {
            assert_eq!(ApiError::from(err).status(), want);
        }
    }
}
