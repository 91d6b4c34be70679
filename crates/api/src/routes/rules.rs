//! Alert rule CRUD + toggle (spec.md §4.5, §6).

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use fleet_common::{FleetError, Page, PageParams, RuleConditions, RuleType, Severity};
use fleet_persistence::{AlertRule, NewRule, RuleFilter, RuleUpdate};

use crate::auth::{require_write, AuthUser};
use crate::state::AppState;
use crate::types::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/:id", get(get_rule).put(update_rule).delete(delete_rule))
        .route("/rules/:id/enabled", patch(set_enabled))
}

#[derive(Debug, Deserialize)]
pub struct RuleQuery {
    #[serde(rename = "type")]
    pub rule_type: Option<RuleType>,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
    #[serde(rename = "instanceId")]
    pub instance_id: Option<Uuid>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRuleBody {
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub severity: Severity,
    pub instance_id: Option<Uuid>,
    pub conditions: RuleConditions,
    pub cooldown_sec: Option<i64>,
    pub enabled: Option<bool>,
    #[serde(default)]
    pub channel_ids: Vec<Uuid>,
}

impl From<NewRuleBody> for NewRule {
    fn from(body: NewRuleBody) -> Self {
        NewRule {
            name: body.name,
            rule_type: body.rule_type,
            severity: body.severity,
            instance_id: body.instance_id,
            conditions: body.conditions,
            cooldown_sec: body.cooldown_sec,
            enabled: body.enabled,
            channel_ids: body.channel_ids,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdateBody {
    pub name: Option<String>,
    pub severity: Option<Severity>,
    pub instance_id: Option<Option<Uuid>>,
    pub conditions: Option<RuleConditions>,
    pub cooldown_sec: Option<i64>,
    pub enabled: Option<bool>,
    pub channel_ids: Option<Vec<Uuid>>,
}

impl From<RuleUpdateBody> for RuleUpdate {
    fn from(body: RuleUpdateBody) -> Self {
        RuleUpdate {
            name: body.name,
            severity: body.severity,
            instance_id: body.instance_id,
            conditions: body.conditions,
            cooldown_sec: body.cooldown_sec,
            enabled: body.enabled,
            channel_ids: body.channel_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledBody {
    pub enabled: bool,
}

async fn list_rules(State(state): State<AppState>, Query(query): Query<RuleQuery>) -> ApiResult<Json<Page<AlertRule>>> {
    let filter = RuleFilter {
        rule_type: query.rule_type,
        severity: query.severity,
        enabled: query.enabled,
        instance_id: query.instance_id,
    };
    let (items, total) = state.rules.list(filter, query.page).await?;
    Ok(Json(Page::new(items, query.page, total)))
}

async fn create_rule(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<NewRuleBody>,
) -> ApiResult<Json<AlertRule>> {
    require_write(&principal)?;
    let created = state.rules.create(body.into()).await?;
    Ok(Json(created))
}

async fn get_rule(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AlertRule>> {
    let rule = state.rules.get(id).await?.ok_or_else(|| FleetError::NotFound(format!("rule {id}")))?;
    Ok(Json(rule))
}

async fn update_rule(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RuleUpdateBody>,
) -> ApiResult<Json<AlertRule>> {
    require_write(&principal)?;
    let updated = state
        .rules
        .update(id, body.into())
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("rule {id}")))?;
    Ok(Json(updated))
}

async fn delete_rule(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    require_write(&principal)?;
    if !state.rules.delete(id).await? {
        return Err(FleetError::NotFound(format!("rule {id}")).into());
    }
    Ok(())
}

async fn set_enabled(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SetEnabledBody>,
) -> ApiResult<Json<AlertRule>> {
    require_write(&principal)?;
    let updated = state
        .rules
        .set_enabled(id, body.enabled)
        .await?
        .ok_or_else(|| FleetError::NotFound(format!("rule {id}")))?;
    Ok(Json(updated))
}
