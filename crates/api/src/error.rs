//! API error types with HTTP response mapping.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::ValidationErrors;
use orders::ServiceError;
use serde::Serialize;

const INTERNAL_MESSAGE: &str = "An unexpected error occurred";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Error returned by the order coordinator.
    Service(ServiceError),
    /// Missing or malformed caller identity.
    Unauthorized(String),
    /// Request body or path could not be parsed.
    BadRequest(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(err) => match err {
                ServiceError::Validation(_)
                | ServiceError::InsufficientStock { .. }
                | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
                ServiceError::NotFound(_) | ServiceError::ProductNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
                ServiceError::Conflict { .. } => StatusCode::CONFLICT,
                ServiceError::Internal(_) | ServiceError::Transient(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Service(err) => err.kind(),
        }
    }

    fn into_body(self) -> ErrorBody {
        let error = self.kind();
        let (message, errors) = match self {
            ApiError::Service(ServiceError::Validation(errors)) => {
                (errors.to_string(), Some(errors.fields().clone()))
            }
            ApiError::Service(err @ (ServiceError::Internal(_) | ServiceError::Transient(_))) => {
                tracing::error!(error = %err, "internal server error");
                (INTERNAL_MESSAGE.to_string(), None)
            }
            ApiError::Service(err) => (err.to_string(), None),
            ApiError::Unauthorized(msg) | ApiError::BadRequest(msg) => (msg, None),
        };

        ErrorBody {
            success: false,
            error,
            message,
            errors,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, axum::Json(self.into_body())).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Service(ServiceError::Validation(errors))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
