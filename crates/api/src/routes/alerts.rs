//! Alert read/ack/resolve/list/summary surface (spec.md §4.4.2, §6).
//! Creation and auto-resolution are the evaluator's job, not exposed here.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleet_common::{Alert, AlertStatus, FleetError, Page, PageParams, Severity};
use fleet_persistence::{AlertFilter, AlertSummary};

use crate::auth::{require_write, AuthUser};
use crate::state::AppState;
use crate::types::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/summary", get(summary))
        .route("/alerts/bulk/acknowledge", axum::routing::post(bulk_acknowledge))
        .route("/alerts/bulk/resolve", axum::routing::post(bulk_resolve))
        .route("/alerts/:id", get(get_alert))
        .route("/alerts/:id/acknowledge", axum::routing::post(acknowledge))
        .route("/alerts/:id/resolve", axum::routing::post(resolve))
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    #[serde(rename = "instanceId")]
    pub instance_id: Option<Uuid>,
    #[serde(rename = "ruleId")]
    pub rule_id: Option<Uuid>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Deserialize)]
pub struct BulkIdsBody {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BulkResult {
    pub alerts: Vec<Alert>,
}

async fn list_alerts(State(state): State<AppState>, Query(query): Query<AlertQuery>) -> ApiResult<Json<Page<Alert>>> {
    let filter = AlertFilter {
        status: query.status,
        severity: query.severity,
        instance_id: query.instance_id,
        rule_id: query.rule_id,
    };
    let (items, total) = state.alerts.list(filter, query.page).await?;
    Ok(Json(Page::new(items, query.page, total)))
}

async fn summary(State(state): State<AppState>) -> ApiResult<Json<AlertSummary>> {
    Ok(Json(state.alerts.summary().await?))
}

async fn get_alert(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Alert>> {
    let alert = state.alerts.get(id).await?.ok_or_else(|| FleetError::NotFound(format!("alert {id}")))?;
    Ok(Json(alert))
}

/// `user_id` would normally come off an authenticated session's identity
/// claim; the principal's `user_id` plays that role here (spec.md §4.4.2).
async fn acknowledge(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Alert>> {
    require_write(&principal)?;
    let updated = state
        .alerts
        .acknowledge(id, &principal.user_id.to_string())
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("alert {id}")))?;
    Ok(Json(updated))
}

async fn resolve(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Alert>> {
    require_write(&principal)?;
    let updated = state
        .alerts
        .resolve(id, &principal.user_id.to_string())
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("alert {id}")))?;
    Ok(Json(updated))
}

async fn bulk_acknowledge(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<BulkIdsBody>,
) -> ApiResult<Json<BulkResult>> {
    require_write(&principal)?;
    let alerts = state.alerts.bulk_acknowledge(&body.ids, &principal.user_id.to_string()).await?;
    Ok(Json(BulkResult { alerts }))
}

async fn bulk_resolve(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<BulkIdsBody>,
) -> ApiResult<Json<BulkResult>> {
    require_write(&principal)?;
    let alerts = state.alerts.bulk_resolve(&body.ids, &principal.user_id.to_string()).await?;
    Ok(Json(BulkResult { alerts }))
}
