use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use fleet_common::{AlertStatus, PageParams, Result, Severity};

use crate::models::{Alert, AlertFilter, AlertSummary};

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub rule_id: Uuid,
    pub instance_id: Option<Uuid>,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub dedupe_key: String,
}

#[async_trait]
pub trait AlertRepo: Send + Sync {
    /// Any alert with this dedupe key whose status is ACTIVE or
    /// ACKNOWLEDGED (spec.md §3: at most one non-terminal alert per
    /// dedupeKey).
    async fn find_non_terminal_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<Alert>>;

    /// Non-terminal alert for this dedupe key fired within the cooldown
    /// window (spec.md §4.4.1 step 4.b).
    async fn find_cooling_down(
        &self,
        dedupe_key: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<Alert>>;

    async fn create(&self, alert: NewAlert) -> Result<Alert>;
    async fn get(&self, id: Uuid) -> Result<Option<Alert>>;
    async fn acknowledge(&self, id: Uuid, user_id: &str) -> Result<Option<Alert>>;
    async fn resolve(&self, id: Uuid, resolved_by: &str) -> Result<Option<Alert>>;
    async fn bulk_acknowledge(&self, ids: &[Uuid], user_id: &str) -> Result<Vec<Alert>>;
    async fn bulk_resolve(&self, ids: &[Uuid], resolved_by: &str) -> Result<Vec<Alert>>;
    async fn list(&self, filter: AlertFilter, page: PageParams) -> Result<(Vec<Alert>, i64)>;
    async fn summary(&self) -> Result<AlertSummary>;
}

pub struct PgAlertRepo {
    pool: PgPool,
}

impl PgAlertRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_alert(row: sqlx::postgres::PgRow) -> Result<Alert> {
        let severity: String = row.try_get("severity")?;
        let status: String = row.try_get("status")?;
        Ok(Alert {
            id: row.try_get("id")?,
            rule_id: row.try_get("rule_id")?,
            instance_id: row.try_get("instance_id")?,
            severity: Severity::from_str(&severity)
                .map_err(|_| fleet_common::FleetError::Validation(format!("bad severity {severity}")))?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            metadata: row.try_get("metadata")?,
            status: AlertStatus::from_str(&status)
                .map_err(|_| fleet_common::FleetError::Validation(format!("bad status {status}")))?,
            fired_at: row.try_get("fired_at")?,
            acknowledged_at: row.try_get("acknowledged_at")?,
            acknowledged_by: row.try_get("acknowledged_by")?,
            resolved_at: row.try_get("resolved_at")?,
            resolved_by: row.try_get("resolved_by")?,
            dedupe_key: row.try_get("dedupe_key")?,
        })
    }

    const SELECT_COLUMNS: &'static str = "id, rule_id, instance_id, severity, title, message, \
        metadata, status, fired_at, acknowledged_at, acknowledged_by, resolved_at, resolved_by, \
        dedupe_key";
}

#[async_trait]
impl AlertRepo for PgAlertRepo {
    async fn find_non_terminal_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<Alert>> {
        let query = format!(
            "SELECT {} FROM alerts WHERE dedupe_key = $1 AND status IN ('ACTIVE', 'ACKNOWLEDGED') \
             ORDER BY fired_at DESC LIMIT 1",
            Self::SELECT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(dedupe_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_alert).transpose()
    }

    async fn find_cooling_down(
        &self,
        dedupe_key: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let query = format!(
            "SELECT {} FROM alerts WHERE dedupe_key = $1 AND status IN ('ACTIVE', 'ACKNOWLEDGED') \
             AND fired_at >= $2 ORDER BY fired_at DESC LIMIT 1",
            Self::SELECT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(dedupe_key)
            .bind(not_before)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_alert).transpose()
    }

    async fn create(&self, alert: NewAlert) -> Result<Alert> {
        let id = Uuid::new_v4();
        let fired_at = Utc::now();
        let status = AlertStatus::Active;

        sqlx::query(
            "INSERT INTO alerts (id, rule_id, instance_id, severity, title, message, metadata, \
             status, fired_at, dedupe_key) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(id)
        .bind(alert.rule_id)
        .bind(alert.instance_id)
        .bind(alert.severity.to_string())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(&alert.metadata)
        .bind(status.to_string())
        .bind(fired_at)
        .bind(&alert.dedupe_key)
        .execute(&self.pool)
        .await?;

        Ok(Alert {
            id,
            rule_id: alert.rule_id,
            instance_id: alert.instance_id,
            severity: alert.severity,
            title: alert.title,
            message: alert.message,
            metadata: alert.metadata,
            status,
            fired_at,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            dedupe_key: alert.dedupe_key,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<Alert>> {
        let query = format!("SELECT {} FROM alerts WHERE id = $1", Self::SELECT_COLUMNS);
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.map(Self::row_to_alert).transpose()
    }

    async fn acknowledge(&self, id: Uuid, user_id: &str) -> Result<Option<Alert>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };
        // Refuses (returns unchanged via None-signalling caller) when RESOLVED (spec.md §4.4.2).
        if existing.status == AlertStatus::Resolved {
            return Ok(None);
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE alerts SET status = $2, acknowledged_at = $3, acknowledged_by = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(AlertStatus::Acknowledged.to_string())
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    async fn resolve(&self, id: Uuid, resolved_by: &str) -> Result<Option<Alert>> {
        if self.get(id).await?.is_none() {
            return Ok(None);
        }
        let now = Utc::now();
        sqlx::query("UPDATE alerts SET status = $2, resolved_at = $3, resolved_by = $4 WHERE id = $1")
            .bind(id)
            .bind(AlertStatus::Resolved.to_string())
            .bind(now)
            .bind(resolved_by)
            .execute(&self.pool)
            .await?;

        self.get(id).await
    }

    async fn bulk_acknowledge(&self, ids: &[Uuid], user_id: &str) -> Result<Vec<Alert>> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(alert) = self.acknowledge(*id, user_id).await? {
                out.push(alert);
            }
        }
        Ok(out)
    }

    async fn bulk_resolve(&self, ids: &[Uuid], resolved_by: &str) -> Result<Vec<Alert>> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(alert) = self.resolve(*id, resolved_by).await? {
                out.push(alert);
            }
        }
        Ok(out)
    }

    async fn list(&self, filter: AlertFilter, page: PageParams) -> Result<(Vec<Alert>, i64)> {
        let mut where_clauses = Vec::new();
        let mut next_bind = 1;

        if filter.status.is_some() {
            where_clauses.push(format!("status = ${next_bind}"));
            next_bind += 1;
        }
        if filter.severity.is_some() {
            where_clauses.push(format!("severity = ${next_bind}"));
            next_bind += 1;
        }
        if filter.instance_id.is_some() {
            where_clauses.push(format!("instance_id = ${next_bind}"));
            next_bind += 1;
        }
        if filter.rule_id.is_some() {
            where_clauses.push(format!("rule_id = ${next_bind}"));
        }

        let mut where_sql = String::new();
        if !where_clauses.is_empty() {
            where_sql = format!(" WHERE {}", where_clauses.join(" AND "));
        }

        let count_query = format!("SELECT count(*) AS count FROM alerts{where_sql}");
        let mut count_q = sqlx::query(&count_query);
        count_q = Self::bind_filter(count_q, &filter);
        let total: i64 = count_q.fetch_one(&self.pool).await?.try_get("count")?;

        let list_query = format!(
            "SELECT {} FROM alerts{where_sql} ORDER BY fired_at DESC OFFSET ${} LIMIT ${}",
            Self::SELECT_COLUMNS,
            next_bind,
            next_bind + 1
        );
        let mut list_q = sqlx::query(&list_query);
        list_q = Self::bind_filter(list_q, &filter);
        list_q = list_q.bind(page.offset()).bind(page.limit());

        let rows = list_q.fetch_all(&self.pool).await?;
        let alerts = rows.into_iter().map(Self::row_to_alert).collect::<Result<Vec<_>>>()?;
        Ok((alerts, total))
    }

    async fn summary(&self) -> Result<AlertSummary> {
        let mut summary = AlertSummary::default();

        let severity_rows = sqlx::query(
            "SELECT severity, count(*) AS count FROM alerts WHERE status = 'ACTIVE' \
             GROUP BY severity",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in severity_rows {
            let severity: String = row.try_get("severity")?;
            let count: i64 = row.try_get("count")?;
            summary.active_by_severity.insert(severity, count);
        }

        let status_rows = sqlx::query("SELECT status, count(*) AS count FROM alerts GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in status_rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            summary.by_status.insert(status, count);
        }

        Ok(summary)
    }
}

impl PgAlertRepo {
    fn bind_filter<'q>(
        mut q: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        filter: &AlertFilter,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        if let Some(status) = filter.status {
            q = q.bind(status.to_string());
        }
        if let Some(severity) = filter.severity {
            q = q.bind(severity.to_string());
        }
        if let Some(instance_id) = filter.instance_id {
            q = q.bind(instance_id);
        }
        if let Some(rule_id) = filter.rule_id {
            q = q.bind(rule_id);
        }
        q
    }
}
