//! HTTP-side authentication: the REST façade reuses the gateway's
//! pre-handshake authentication flow (spec.md §6, §4.2) rather than
//! maintaining a second credential check.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

use fleet_common::FleetError;
use fleet_gateway::auth::{authenticate, extract_raw_key, Principal};

use crate::state::AppState;
use crate::types::ApiError;

#[derive(Debug, Deserialize)]
struct ApiKeyQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

/// An authenticated caller, extracted the same way a WebSocket upgrade is
/// authenticated: `X-Api-Key` header or `apiKey` query parameter, hashed
/// and looked up against the stored key (spec.md §6).
pub struct AuthUser(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_key = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok());

        let query = Query::<ApiKeyQuery>::try_from_uri(&parts.uri)
            .map(|q| q.0)
            .unwrap_or(ApiKeyQuery { api_key: None });

        let raw_key = extract_raw_key(header_key, query.api_key.as_deref());
        let instance_header = parts
            .headers
            .get("x-instance-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let principal = authenticate(state.api_keys.as_ref(), raw_key.as_deref(), instance_header.as_deref()).await?;
        Ok(AuthUser(principal))
    }
}

/// Gate for mutating endpoints: VIEWER may read but not write (spec.md §3).
pub fn require_write(principal: &Principal) -> Result<(), ApiError> {
    if principal.role.can_write() {
        Ok(())
    } else {
        Err(ApiError(FleetError::Forbidden("role cannot write".to_string())))
    }
}

/// Gate for the secret-reveal endpoint: ADMIN or OPERATOR only (spec.md §3:
/// "reveal requires elevated role").
pub fn require_elevated(principal: &Principal) -> Result<(), ApiError> {
    if principal.role.is_elevated() {
        Ok(())
    } else {
        Err(ApiError(FleetError::Forbidden("reveal requires an elevated role".to_string())))
    }
}
