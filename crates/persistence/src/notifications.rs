use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use fleet_common::Result;

use crate::models::AlertNotification;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub alert_id: Uuid,
    pub channel_id: Uuid,
    pub success: bool,
    pub error: Option<String>,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    /// Immutable delivery-attempt record (spec.md §3: AlertNotification).
    async fn create(&self, notification: NewNotification) -> Result<AlertNotification>;
    async fn list_for_alert(&self, alert_id: Uuid) -> Result<Vec<AlertNotification>>;
}

pub struct PgNotificationRepo {
    pool: PgPool,
}

impl PgNotificationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_notification(row: sqlx::postgres::PgRow) -> Result<AlertNotification> {
        Ok(AlertNotification {
            id: row.try_get("id")?,
            alert_id: row.try_get("alert_id")?,
            channel_id: row.try_get("channel_id")?,
            sent_at: row.try_get("sent_at")?,
            success: row.try_get("success")?,
            error: row.try_get("error")?,
            payload: row.try_get("payload")?,
        })
    }
}

#[async_trait]
impl NotificationRepo for PgNotificationRepo {
    async fn create(&self, notification: NewNotification) -> Result<AlertNotification> {
        let id = Uuid::new_v4();
        let sent_at = Utc::now();

        sqlx::query(
            "INSERT INTO alert_notifications (id, alert_id, channel_id, sent_at, success, \
             error, payload) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(notification.alert_id)
        .bind(notification.channel_id)
        .bind(sent_at)
        .bind(notification.success)
        .bind(&notification.error)
        .bind(&notification.payload)
        .execute(&self.pool)
        .await?;

        Ok(AlertNotification {
            id,
            alert_id: notification.alert_id,
            channel_id: notification.channel_id,
            sent_at,
            success: notification.success,
            error: notification.error,
            payload: notification.payload,
        })
    }

    async fn list_for_alert(&self, alert_id: Uuid) -> Result<Vec<AlertNotification>> {
        let rows = sqlx::query(
            "SELECT id, alert_id, channel_id, sent_at, success, error, payload \
             FROM alert_notifications WHERE alert_id = $1 ORDER BY sent_at DESC",
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_notification).collect()
    }
}
