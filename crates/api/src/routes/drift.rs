//! Drift snapshot/event read surface (spec.md §4.5, §6: "drift snapshots +
//! events + remediations"). Thin pass-through to [`DriftSummaryService`];
//! the core doesn't alter drift state, it only reports on what the
//! agent-reported config snapshots already say (spec.md §4.5).

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use fleet_common::FleetError;
use fleet_persistence::{ConfigSnapshot, DriftEvent, DriftSummary};

use crate::state::AppState;
use crate::types::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/drift/summary", get(summary))
        .route("/drift/events", get(unresolved_events))
        .route("/drift/instances/:instance_id/snapshot", get(latest_snapshot))
}

async fn summary(State(state): State<AppState>) -> ApiResult<Json<DriftSummary>> {
    Ok(Json(state.drift.summary().await?))
}

async fn unresolved_events(State(state): State<AppState>) -> ApiResult<Json<Vec<DriftEvent>>> {
    Ok(Json(state.drift.unresolved_events().await?))
}

async fn latest_snapshot(
    State(state): State<AppState>,
    Path(instance_id): Path<Uuid>,
) -> ApiResult<Json<ConfigSnapshot>> {
    let snapshot = state
        .drift
        .latest_snapshot(instance_id)
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("config snapshot for instance {instance_id}")))?;
    Ok(Json(snapshot))
}
