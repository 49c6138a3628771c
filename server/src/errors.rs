use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{BoxError, Json};
use quarry_core::Error;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) code: &'static str,
    pub(crate) message: String,
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_argument",
            message: message.into(),
        }
    }

    pub(crate) fn payload_too_large(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            code: "payload_too_large",
            message: message.into(),
        }
    }

    fn request_timeout() -> Self {
        Self {
            status: StatusCode::REQUEST_TIMEOUT,
            code: "request_timeout",
            message: "request timed out".to_string(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = match &error {
            Error::CollectionNotFound(_) | Error::PointNotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::CollectionDropped(_) => StatusCode::GONE,
            Error::DimensionMismatch { .. }
            | Error::InvalidFilter(_)
            | Error::NonFiniteValue { .. }
            | Error::InvalidPayload(_)
            | Error::InvalidConfig(_)
            | Error::InvalidName => StatusCode::BAD_REQUEST,
            Error::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(%error, "engine call failed");
        }
        Self {
            status,
            code: error_code(&error),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                code: self.code,
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// Stable machine-readable code for an engine error.
pub(crate) fn error_code(error: &Error) -> &'static str {
    match error {
        Error::CollectionNotFound(_) | Error::PointNotFound(_) => "not_found",
        Error::AlreadyExists(_) => "already_exists",
        Error::DimensionMismatch { .. } => "dimension_mismatch",
        Error::CollectionDropped(_) => "collection_dropped",
        Error::InvalidFilter(_) => "invalid_filter",
        Error::NonFiniteValue { .. } => "non_finite_value",
        Error::InvalidPayload(_) => "invalid_payload",
        Error::InvalidConfig(_) => "invalid_config",
        Error::InvalidName => "invalid_name",
        Error::Persistence(_) => "internal",
    }
}

pub(crate) fn map_json_rejection(rejection: JsonRejection) -> ApiError {
    let status = rejection.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large("request body exceeds configured size limit");
    }
    if status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
        return ApiError::invalid_argument("content-type must be application/json");
    }
    ApiError::invalid_argument(format!("invalid JSON payload: {}", rejection.body_text()))
}

pub(crate) async fn handle_middleware_error(error: BoxError) -> Response {
    if error.is::<tower::timeout::error::Elapsed>() {
        return ApiError::request_timeout().into_response();
    }

    tracing::error!(%error, "middleware error");
    ApiError::internal("internal middleware error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_stable_statuses() {
        let cases = [
            (Error::CollectionNotFound("a".to_string()), StatusCode::NOT_FOUND),
            (Error::PointNotFound(3), StatusCode::NOT_FOUND),
            (Error::AlreadyExists("a".to_string()), StatusCode::CONFLICT),
            (Error::CollectionDropped("a".to_string()), StatusCode::GONE),
            (
                Error::DimensionMismatch {
                    expected: 4,
                    got: 2,
                },
                StatusCode::BAD_REQUEST,
            ),
            (Error::InvalidFilter("x".to_string()), StatusCode::BAD_REQUEST),
            (
                Error::Persistence("disk".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn error_codes_distinguish_item_failures() {
        assert_eq!(
            error_code(&Error::NonFiniteValue { index: 1 }),
            "non_finite_value"
        );
        assert_eq!(error_code(&Error::PointNotFound(1)), "not_found");
    }
}
