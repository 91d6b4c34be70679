use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use fleet_common::{DriftStatus, Result, Severity};

use crate::models::{ConfigSnapshot, DriftEvent, DriftSummary};

#[async_trait]
pub trait DriftRepo: Send + Sync {
    async fn latest_snapshot(&self, instance_id: Uuid) -> Result<Option<ConfigSnapshot>>;
    async fn unresolved_events(&self) -> Result<Vec<DriftEvent>>;
    async fn summary(&self) -> Result<DriftSummary>;
}

pub struct PgDriftRepo {
    pool: PgPool,
}

impl PgDriftRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriftRepo for PgDriftRepo {
    async fn latest_snapshot(&self, instance_id: Uuid) -> Result<Option<ConfigSnapshot>> {
        let row = sqlx::query(
            "SELECT id, instance_id, taken_at, declared, actual, drift_status, config_hash \
             FROM config_snapshots WHERE instance_id = $1 ORDER BY taken_at DESC LIMIT 1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let drift_status: String = row.try_get("drift_status")?;
        Ok(Some(ConfigSnapshot {
            id: row.try_get("id")?,
            instance_id: row.try_get("instance_id")?,
            taken_at: row.try_get("taken_at")?,
            declared: row.try_get("declared")?,
            actual: row.try_get("actual")?,
            drift_status: DriftStatus::from_str(&drift_status).unwrap_or(DriftStatus::Unknown),
            config_hash: row.try_get("config_hash")?,
        }))
    }

    async fn unresolved_events(&self) -> Result<Vec<DriftEvent>> {
        let rows = sqlx::query(
            "SELECT id, snapshot_id, severity, field_path, declared_val, actual_val, \
             description, detected_at, resolved_at, remediation FROM drift_events \
             WHERE resolved_at IS NULL ORDER BY detected_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let severity: String = row.try_get("severity")?;
                Ok(DriftEvent {
                    id: row.try_get("id")?,
                    snapshot_id: row.try_get("snapshot_id")?,
                    severity: Severity::from_str(&severity).unwrap_or(Severity::Medium),
                    field_path: row.try_get("field_path")?,
                    declared_val: row.try_get("declared_val")?,
                    actual_val: row.try_get("actual_val")?,
                    description: row.try_get("description")?,
                    detected_at: row.try_get("detected_at")?,
                    resolved_at: row.try_get("resolved_at")?,
                    remediation: row.try_get("remediation")?,
                })
            })
            .collect()
    }

    async fn summary(&self) -> Result<DriftSummary> {
        let mut summary = DriftSummary {
            by_severity: Default::default(),
            by_status: Default::default(),
            instances_with_drift: 0,
            total_unresolved: 0,
        };

        let severity_rows = sqlx::query(
            "SELECT severity, count(*) AS count FROM drift_events WHERE resolved_at IS NULL \
             GROUP BY severity",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in severity_rows {
            let severity: String = row.try_get("severity")?;
            let count: i64 = row.try_get("count")?;
            summary.by_severity.insert(severity, count);
        }

        let status_rows = sqlx::query(
            "SELECT drift_status, count(*) AS count FROM config_snapshots GROUP BY drift_status",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in status_rows {
            let status: String = row.try_get("drift_status")?;
            let count: i64 = row.try_get("count")?;
            summary.by_status.insert(status, count);
        }

        summary.instances_with_drift = sqlx::query(
            "SELECT count(DISTINCT instance_id) AS count FROM config_snapshots \
             WHERE drift_status = 'DRIFTED'",
        )
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;

        summary.total_unresolved = sqlx::query(
            "SELECT count(*) AS count FROM drift_events WHERE resolved_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;

        Ok(summary)
    }
}
