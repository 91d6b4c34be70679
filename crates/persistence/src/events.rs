use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use fleet_common::Result;

/// Persists `event:instance` envelopes (spec.md §4.2 dispatch table).
#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn record(&self, instance_id: Uuid, event_type: &str, metadata: &serde_json::Value) -> Result<()>;
}

pub struct PgEventRepo {
    pool: PgPool,
}

impl PgEventRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepo for PgEventRepo {
    async fn record(&self, instance_id: Uuid, event_type: &str, metadata: &serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO instance_events (id, instance_id, event_type, metadata, occurred_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(instance_id)
        .bind(event_type)
        .bind(metadata)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
