//! Response envelopes and the HTTP error mapping (spec.md §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use fleet_common::FleetError;

/// Machine-readable error body sent on every non-2xx response (spec.md §7).
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    fn from_error(err: &FleetError) -> Self {
        Self {
            error: err.to_string(),
            code: Some(err.code().to_string()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Wraps [`FleetError`] so route handlers can return it directly via `?`
/// and axum turns it into the right HTTP status plus an [`ErrorResponse`]
/// body (spec.md §7's error taxonomy mapped onto HTTP status codes).
pub struct ApiError(pub FleetError);

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FleetError::MissingApiKey | FleetError::InvalidApiKey | FleetError::ExpiredApiKey => {
                StatusCode::UNAUTHORIZED
            }
            FleetError::Forbidden(_) => StatusCode::FORBIDDEN,
            FleetError::NotFound(_) => StatusCode::NOT_FOUND,
            FleetError::Validation(_) | FleetError::Protocol(_) => StatusCode::BAD_REQUEST,
            FleetError::Persistence(_)
            | FleetError::Broker(_)
            | FleetError::Dispatch(_)
            | FleetError::Config(_)
            | FleetError::Io(_)
            | FleetError::Serialization(_)
            | FleetError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, axum::Json(ErrorResponse::from_error(&self.0))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
