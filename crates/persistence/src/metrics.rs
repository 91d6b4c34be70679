use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use fleet_common::Result;

use crate::models::Metric;

#[async_trait]
pub trait MetricRepo: Send + Sync {
    async fn insert(&self, metric: &Metric) -> Result<()>;

    /// One ranked query for the latest metric per instance (spec.md §4.4.1
    /// evaluator step 3: "Latest is greatest timestamp").
    async fn latest_per_instance(&self) -> Result<Vec<Metric>>;

    async fn latest_for_instance(&self, instance_id: Uuid) -> Result<Option<Metric>>;

    /// Samples within `[since, now)`, used by the ANOMALY evaluator's
    /// window query (spec.md §4.4.1).
    async fn range(&self, instance_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Metric>>;
}

pub struct PgMetricRepo {
    pool: PgPool,
}

impl PgMetricRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_metric(row: sqlx::postgres::PgRow) -> Result<Metric> {
    Ok(Metric {
        instance_id: row.try_get("instance_id")?,
        timestamp: row.try_get("timestamp")?,
        cpu_percent: row.try_get("cpu_percent")?,
        mem_used: row.try_get("mem_used")?,
        mem_total: row.try_get("mem_total")?,
        disk_used: row.try_get("disk_used")?,
        disk_total: row.try_get("disk_total")?,
        load_avg_1: row.try_get("load_avg_1")?,
        load_avg_5: row.try_get("load_avg_5")?,
        net_bytes_sent: row.try_get("net_bytes_sent")?,
        net_bytes_recv: row.try_get("net_bytes_recv")?,
    })
}

#[async_trait]
impl MetricRepo for PgMetricRepo {
    async fn insert(&self, metric: &Metric) -> Result<()> {
        sqlx::query(
            "INSERT INTO metrics (instance_id, timestamp, cpu_percent, mem_used, mem_total, \
             disk_used, disk_total, load_avg_1, load_avg_5, net_bytes_sent, net_bytes_recv) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(metric.instance_id)
        .bind(metric.timestamp)
        .bind(metric.cpu_percent)
        .bind(metric.mem_used)
        .bind(metric.mem_total)
        .bind(metric.disk_used)
        .bind(metric.disk_total)
        .bind(metric.load_avg_1)
        .bind(metric.load_avg_5)
        .bind(metric.net_bytes_sent)
        .bind(metric.net_bytes_recv)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_per_instance(&self) -> Result<Vec<Metric>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (instance_id) instance_id, timestamp, cpu_percent, mem_used, \
             mem_total, disk_used, disk_total, load_avg_1, load_avg_5, net_bytes_sent, \
             net_bytes_recv FROM metrics ORDER BY instance_id, timestamp DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_metric).collect()
    }

    async fn latest_for_instance(&self, instance_id: Uuid) -> Result<Option<Metric>> {
        let row = sqlx::query(
            "SELECT instance_id, timestamp, cpu_percent, mem_used, mem_total, disk_used, \
             disk_total, load_avg_1, load_avg_5, net_bytes_sent, net_bytes_recv FROM metrics \
             WHERE instance_id = $1 ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_metric).transpose()
    }

    async fn range(&self, instance_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Metric>> {
        let rows = sqlx::query(
            "SELECT instance_id, timestamp, cpu_percent, mem_used, mem_total, disk_used, \
             disk_total, load_avg_1, load_avg_5, net_bytes_sent, net_bytes_recv FROM metrics \
             WHERE instance_id = $1 AND timestamp >= $2 AND timestamp < now() \
             ORDER BY timestamp ASC",
        )
        .bind(instance_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_metric).collect()
    }
}
