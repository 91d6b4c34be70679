use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use fleet_common::Result;

use crate::models::Heartbeat;

#[async_trait]
pub trait HeartbeatRepo: Send + Sync {
    async fn insert(&self, heartbeat: &Heartbeat) -> Result<()>;

    /// One ranked query for the latest heartbeat per instance (spec.md
    /// §4.4.1 evaluator step 3).
    async fn latest_per_instance(&self) -> Result<Vec<Heartbeat>>;

    async fn latest_for_instance(&self, instance_id: Uuid) -> Result<Option<Heartbeat>>;
}

pub struct PgHeartbeatRepo {
    pool: PgPool,
}

impl PgHeartbeatRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_heartbeat(row: sqlx::postgres::PgRow) -> Result<Heartbeat> {
    Ok(Heartbeat {
        instance_id: row.try_get("instance_id")?,
        timestamp: row.try_get("timestamp")?,
        agent_version: row.try_get("agent_version")?,
        uptime_sec: row.try_get("uptime_sec")?,
    })
}

#[async_trait]
impl HeartbeatRepo for PgHeartbeatRepo {
    async fn insert(&self, heartbeat: &Heartbeat) -> Result<()> {
        sqlx::query(
            "INSERT INTO heartbeats (instance_id, timestamp, agent_version, uptime_sec) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(heartbeat.instance_id)
        .bind(heartbeat.timestamp)
        .bind(&heartbeat.agent_version)
        .bind(heartbeat.uptime_sec)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_per_instance(&self) -> Result<Vec<Heartbeat>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (instance_id) instance_id, timestamp, agent_version, \
             uptime_sec FROM heartbeats ORDER BY instance_id, timestamp DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_heartbeat).collect()
    }

    async fn latest_for_instance(&self, instance_id: Uuid) -> Result<Option<Heartbeat>> {
        let row = sqlx::query(
            "SELECT instance_id, timestamp, agent_version, uptime_sec FROM heartbeats \
             WHERE instance_id = $1 ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_heartbeat).transpose()
    }
}
