//! Security summary + secrets vault CRUD/rotate/reveal (spec.md §3, §4.5,
//! §6). Reveal is the one read endpoint that returns plaintext-adjacent
//! material (the ciphertext the vault stores) and is gated to an elevated
//! role (spec.md §3: "reveal requires elevated role").

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use fleet_common::FleetError;
use fleet_persistence::{NewSecret, RevealedSecret, Secret, SecretUpdate, SecuritySummary};

use crate::auth::{require_elevated, require_write, AuthUser};
use crate::state::AppState;
use crate::types::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/security/summary", get(summary))
        .route("/secrets", get(list_secrets).post(create_secret))
        .route(
            "/secrets/:id",
            get(get_secret).put(update_secret).delete(delete_secret),
        )
        .route("/secrets/:id/rotate", axum::routing::post(rotate_secret))
        .route("/secrets/:id/reveal", axum::routing::post(reveal_secret))
}

async fn summary(State(state): State<AppState>) -> ApiResult<Json<SecuritySummary>> {
    Ok(Json(state.security.summary().await?))
}

#[derive(Debug, Deserialize)]
pub struct InstanceQuery {
    #[serde(rename = "instanceId")]
    pub instance_id: Uuid,
}

async fn list_secrets(
    State(state): State<AppState>,
    Query(query): Query<InstanceQuery>,
) -> ApiResult<Json<Vec<Secret>>> {
    Ok(Json(state.security.secrets_for_instance(query.instance_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSecretBody {
    pub instance_id: Option<Uuid>,
    pub name: String,
    #[serde(rename = "type")]
    pub secret_type: String,
    pub value_ciphertext: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn create_secret(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<NewSecretBody>,
) -> ApiResult<Json<Secret>> {
    require_write(&principal)?;
    let created = state
        .security
        .create_secret(NewSecret {
            instance_id: body.instance_id,
            name: body.name,
            secret_type: body.secret_type,
            value_ciphertext: body.value_ciphertext,
            expires_at: body.expires_at,
        })
        .await?;
    Ok(Json(created))
}

async fn get_secret(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Secret>> {
    let secret = state.security.get_secret(id).await?.ok_or_else(|| FleetError::NotFound(format!("secret {id}")))?;
    Ok(Json(secret))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecretUpdateBody {
    pub name: Option<String>,
    pub expires_at: Option<Option<chrono::DateTime<chrono::Utc>>>,
}

async fn update_secret(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SecretUpdateBody>,
) -> ApiResult<Json<Secret>> {
    require_write(&principal)?;
    let updated = state
        .security
        .update_secret(id, SecretUpdate { name: body.name, expires_at: body.expires_at })
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("secret {id}")))?;
    Ok(Json(updated))
}

async fn delete_secret(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    require_write(&principal)?;
    if !state.security.delete_secret(id).await? {
        return Err(FleetError::NotFound(format!("secret {id}")).into());
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateSecretBody {
    pub value_ciphertext: String,
}

async fn rotate_secret(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RotateSecretBody>,
) -> ApiResult<Json<Secret>> {
    require_write(&principal)?;
    let rotated = state
        .security
        .rotate_secret(id, body.value_ciphertext)
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("secret {id}")))?;
    Ok(Json(rotated))
}

async fn reveal_secret(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RevealedSecret>> {
    require_elevated(&principal)?;
    let revealed = state
        .security
        .reveal_secret(id)
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("secret {id}")))?;
    Ok(Json(revealed))
}
