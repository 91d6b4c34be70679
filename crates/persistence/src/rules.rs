use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use fleet_common::{PageParams, Result, RuleType, Severity};

use crate::models::{AlertRule, RuleFilter};

#[derive(Debug, Clone)]
pub struct NewRule {
    pub name: String,
    pub rule_type: RuleType,
    pub severity: Severity,
    pub instance_id: Option<Uuid>,
    pub conditions: fleet_common::RuleConditions,
    pub cooldown_sec: Option<i64>,
    pub enabled: Option<bool>,
    pub channel_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub severity: Option<Severity>,
    pub instance_id: Option<Option<Uuid>>,
    pub conditions: Option<fleet_common::RuleConditions>,
    pub cooldown_sec: Option<i64>,
    pub enabled: Option<bool>,
    pub channel_ids: Option<Vec<Uuid>>,
}

#[async_trait]
pub trait RuleRepo: Send + Sync {
    async fn create(&self, rule: NewRule) -> Result<AlertRule>;
    async fn get(&self, id: Uuid) -> Result<Option<AlertRule>>;
    async fn update(&self, id: Uuid, update: RuleUpdate) -> Result<Option<AlertRule>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Option<AlertRule>>;
    async fn list(&self, filter: RuleFilter, page: PageParams) -> Result<(Vec<AlertRule>, i64)>;
    /// All enabled rules joined with their channel ids (spec.md §4.4.1 step 1).
    async fn list_enabled(&self) -> Result<Vec<AlertRule>>;
}

pub struct PgRuleRepo {
    pool: PgPool,
}

impl PgRuleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn channel_ids_for(&self, rule_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT channel_id FROM rule_channels WHERE rule_id = $1 ORDER BY channel_id",
        )
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|row| row.try_get("channel_id").map_err(Into::into)).collect()
    }

    async fn replace_channel_ids(&self, rule_id: Uuid, channel_ids: &[Uuid]) -> Result<()> {
        sqlx::query("DELETE FROM rule_channels WHERE rule_id = $1")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;
        for channel_id in channel_ids {
            sqlx::query("INSERT INTO rule_channels (rule_id, channel_id) VALUES ($1, $2)")
                .bind(rule_id)
                .bind(channel_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn row_to_rule(&self, row: sqlx::postgres::PgRow) -> Result<AlertRule> {
        let id: Uuid = row.try_get("id")?;
        let rule_type: String = row.try_get("type")?;
        let severity: String = row.try_get("severity")?;
        let conditions: serde_json::Value = row.try_get("conditions")?;
        let channel_ids = self.channel_ids_for(id).await?;

        Ok(AlertRule {
            id,
            name: row.try_get("name")?,
            rule_type: RuleType::from_str(&rule_type)
                .map_err(|_| fleet_common::FleetError::Validation(format!("bad rule type {rule_type}")))?,
            severity: Severity::from_str(&severity)
                .map_err(|_| fleet_common::FleetError::Validation(format!("bad severity {severity}")))?,
            instance_id: row.try_get("instance_id")?,
            conditions: serde_json::from_value(conditions)
                .map_err(|e| fleet_common::FleetError::Validation(e.to_string()))?,
            cooldown_sec: row.try_get("cooldown_sec")?,
            enabled: row.try_get("enabled")?,
            channel_ids,
        })
    }
}

#[async_trait]
impl RuleRepo for PgRuleRepo {
    async fn create(&self, rule: NewRule) -> Result<AlertRule> {
        let id = Uuid::new_v4();
        let conditions = serde_json::to_value(&rule.conditions)
            .map_err(|e| fleet_common::FleetError::Validation(e.to_string()))?;
        let cooldown_sec = rule.cooldown_sec.unwrap_or(300);
        let enabled = rule.enabled.unwrap_or(true);

        sqlx::query(
            "INSERT INTO alert_rules (id, name, type, severity, instance_id, conditions, \
             cooldown_sec, enabled) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(&rule.name)
        .bind(rule.rule_type.to_string())
        .bind(rule.severity.to_string())
        .bind(rule.instance_id)
        .bind(&conditions)
        .bind(cooldown_sec)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        self.replace_channel_ids(id, &rule.channel_ids).await?;

        Ok(AlertRule {
            id,
            name: rule.name,
            rule_type: rule.rule_type,
            severity: rule.severity,
            instance_id: rule.instance_id,
            conditions: rule.conditions,
            cooldown_sec,
            enabled,
            channel_ids: rule.channel_ids,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<AlertRule>> {
        let row = sqlx::query(
            "SELECT id, name, type, severity, instance_id, conditions, cooldown_sec, enabled \
             FROM alert_rules WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_rule(row).await?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: Uuid, update: RuleUpdate) -> Result<Option<AlertRule>> {
        let Some(mut existing) = self.get(id).await? else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            existing.name = name;
        }
        if let Some(severity) = update.severity {
            existing.severity = severity;
        }
        if let Some(instance_id) = update.instance_id {
            existing.instance_id = instance_id;
        }
        if let Some(conditions) = update.conditions {
            existing.conditions = conditions;
        }
        if let Some(cooldown_sec) = update.cooldown_sec {
            existing.cooldown_sec = cooldown_sec;
        }
        if let Some(enabled) = update.enabled {
            existing.enabled = enabled;
        }

        let conditions = serde_json::to_value(&existing.conditions)
            .map_err(|e| fleet_common::FleetError::Validation(e.to_string()))?;

        sqlx::query(
            "UPDATE alert_rules SET name = $2, severity = $3, instance_id = $4, \
             conditions = $5, cooldown_sec = $6, enabled = $7 WHERE id = $1",
        )
        .bind(id)
        .bind(&existing.name)
        .bind(existing.severity.to_string())
        .bind(existing.instance_id)
        .bind(&conditions)
        .bind(existing.cooldown_sec)
        .bind(existing.enabled)
        .execute(&self.pool)
        .await?;

        // channelIds semantics is replace-when-provided (spec.md §4.5).
        if let Some(channel_ids) = update.channel_ids {
            self.replace_channel_ids(id, &channel_ids).await?;
            existing.channel_ids = channel_ids;
        }

        Ok(Some(existing))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM alert_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Option<AlertRule>> {
        self.update(
            id,
            RuleUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    async fn list(&self, filter: RuleFilter, page: PageParams) -> Result<(Vec<AlertRule>, i64)> {
        // Built with a composable WHERE clause to honour each optional
        // filter (type, severity, enabled, instanceId) per spec.md §4.5.
        let mut where_clauses = Vec::new();
        let mut next_bind = 1;

        if filter.rule_type.is_some() {
            where_clauses.push(format!("type = ${next_bind}"));
            next_bind += 1;
        }
        if filter.severity.is_some() {
            where_clauses.push(format!("severity = ${next_bind}"));
            next_bind += 1;
        }
        if filter.enabled.is_some() {
            where_clauses.push(format!("enabled = ${next_bind}"));
            next_bind += 1;
        }
        // instance_id rules: null-scoped rules apply to every instance.
        if filter.instance_id.is_some() {
            where_clauses.push(format!("(instance_id = ${next_bind} OR instance_id IS NULL)"));
        }

        let mut query = "SELECT id FROM alert_rules".to_string();
        if !where_clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&where_clauses.join(" AND "));
        }
        query.push_str(" ORDER BY name");

        let mut q = sqlx::query(&query);
        if let Some(rule_type) = filter.rule_type {
            q = q.bind(rule_type.to_string());
        }
        if let Some(severity) = filter.severity {
            q = q.bind(severity.to_string());
        }
        if let Some(enabled) = filter.enabled {
            q = q.bind(enabled);
        }
        if let Some(instance_id) = filter.instance_id {
            q = q.bind(instance_id);
        }
        let id_rows = q.fetch_all(&self.pool).await?;
        let total = id_rows.len() as i64;

        let offset = page.offset() as usize;
        let limit = page.limit() as usize;
        let mut rules = Vec::new();
        for row in id_rows.into_iter().skip(offset).take(limit) {
            let id: Uuid = row.try_get("id")?;
            if let Some(rule) = self.get(id).await? {
                rules.push(rule);
            }
        }

        Ok((rules, total))
    }

    async fn list_enabled(&self) -> Result<Vec<AlertRule>> {
        let rows = sqlx::query("SELECT id FROM alert_rules WHERE enabled = true")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = Vec::new();
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            if let Some(rule) = self.get(id).await? {
                rules.push(rule);
            }
        }
        Ok(rules)
    }
}
