//! Notification channel CRUD + test + send-test (spec.md §4.5, §6).
//!
//! `test` exercises a not-yet-persisted `{type, config}` pair directly
//! against the dispatcher (spec.md §4.4.3: "test(channelType, config)");
//! `send-test` (`test(id)`) loads a persisted channel's unmasked config and
//! does the same (spec.md §4.5: "test(id) loads the channel and invokes
//! dispatcher test(type, config)").

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleet_common::{ChannelConfig, ChannelType, FleetError, Page, PageParams};
use fleet_persistence::{ChannelUpdate, NewChannel, NotificationChannel};

use crate::auth::{require_write, AuthUser};
use crate::state::AppState;
use crate::types::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channels", get(list_channels).post(create_channel))
        .route("/channels/test", axum::routing::post(test_config))
        .route(
            "/channels/:id",
            get(get_channel).put(update_channel).delete(delete_channel),
        )
        .route("/channels/:id/send-test", axum::routing::post(send_test))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChannelBody {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub config: ChannelConfig,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdateBody {
    pub name: Option<String>,
    pub config: Option<ChannelConfig>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfigBody {
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub config: ChannelConfig,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TestResponse {
    pub success: bool,
    pub error: Option<String>,
}

async fn list_channels(
    State(state): State<AppState>,
    axum::extract::Query(page): axum::extract::Query<PageParams>,
) -> ApiResult<Json<Page<NotificationChannel>>> {
    let (items, total) = state.channels.list(page).await?;
    Ok(Json(Page::new(items, page, total)))
}

async fn create_channel(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<NewChannelBody>,
) -> ApiResult<Json<NotificationChannel>> {
    require_write(&principal)?;
    let created = state
        .channels
        .create(NewChannel {
            name: body.name,
            config: body.config,
            enabled: body.enabled,
        })
        .await?;
    Ok(Json(created))
}

async fn get_channel(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<NotificationChannel>> {
    let channel = state
        .channels
        .get(id)
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("channel {id}")))?;
    Ok(Json(channel))
}

async fn update_channel(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ChannelUpdateBody>,
) -> ApiResult<Json<NotificationChannel>> {
    require_write(&principal)?;
    let updated = state
        .channels
        .update(
            id,
            ChannelUpdate {
                name: body.name,
                config: body.config,
                enabled: body.enabled,
            },
        )
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("channel {id}")))?;
    Ok(Json(updated))
}

async fn delete_channel(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    require_write(&principal)?;
    if !state.channels.delete(id).await? {
        return Err(FleetError::NotFound(format!("channel {id}")).into());
    }
    Ok(())
}

async fn test_config(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<TestConfigBody>,
) -> ApiResult<Json<TestResponse>> {
    require_write(&principal)?;
    let result = state.dispatcher.test(body.channel_type, &body.config).await;
    Ok(Json(TestResponse {
        success: result.success,
        error: result.error,
    }))
}

async fn send_test(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TestResponse>> {
    require_write(&principal)?;
    let result = state
        .channels
        .test(id)
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("channel {id}")))?;
    Ok(Json(TestResponse {
        success: result.success,
        error: result.error,
    }))
}
