use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use fleet_common::{ChannelConfig, ChannelType, PageParams, Result};

use crate::models::NotificationChannel;

#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub config: ChannelConfig,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub config: Option<ChannelConfig>,
    pub enabled: Option<bool>,
}

#[async_trait]
pub trait ChannelRepo: Send + Sync {
    async fn create(&self, channel: NewChannel) -> Result<NotificationChannel>;
    async fn get(&self, id: Uuid) -> Result<Option<NotificationChannel>>;
    async fn update(&self, id: Uuid, update: ChannelUpdate) -> Result<Option<NotificationChannel>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn list(&self, page: PageParams) -> Result<(Vec<NotificationChannel>, i64)>;
    /// Fetch by id set, used by the dispatcher when loading a rule's channels.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<NotificationChannel>>;
}

pub struct PgChannelRepo {
    pool: PgPool,
}

impl PgChannelRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_channel(row: sqlx::postgres::PgRow) -> Result<NotificationChannel> {
        let channel_type: String = row.try_get("type")?;
        let config: serde_json::Value = row.try_get("config")?;
        Ok(NotificationChannel {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            channel_type: ChannelType::from_str(&channel_type)
                .map_err(|_| fleet_common::FleetError::Validation(format!("bad channel type {channel_type}")))?,
            config: serde_json::from_value(config)
                .map_err(|e| fleet_common::FleetError::Validation(e.to_string()))?,
            enabled: row.try_get("enabled")?,
        })
    }
}

#[async_trait]
impl ChannelRepo for PgChannelRepo {
    async fn create(&self, channel: NewChannel) -> Result<NotificationChannel> {
        let id = Uuid::new_v4();
        let enabled = channel.enabled.unwrap_or(true);
        let config_value = serde_json::to_value(&channel.config)
            .map_err(|e| fleet_common::FleetError::Validation(e.to_string()))?;

        sqlx::query(
            "INSERT INTO notification_channels (id, name, type, config, enabled) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(&channel.name)
        .bind(channel.config.channel_type().to_string())
        .bind(&config_value)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        Ok(NotificationChannel {
            id,
            name: channel.name,
            channel_type: channel.config.channel_type(),
            config: channel.config,
            enabled,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationChannel>> {
        let row = sqlx::query(
            "SELECT id, name, type, config, enabled FROM notification_channels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_channel).transpose()
    }

    async fn update(&self, id: Uuid, update: ChannelUpdate) -> Result<Option<NotificationChannel>> {
        let Some(mut existing) = self.get(id).await? else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            existing.name = name;
        }
        if let Some(config) = update.config {
            existing.channel_type = config.channel_type();
            existing.config = config;
        }
        if let Some(enabled) = update.enabled {
            existing.enabled = enabled;
        }

        let config_value = serde_json::to_value(&existing.config)
            .map_err(|e| fleet_common::FleetError::Validation(e.to_string()))?;

        sqlx::query(
            "UPDATE notification_channels SET name = $2, type = $3, config = $4, enabled = $5 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&existing.name)
        .bind(existing.channel_type.to_string())
        .bind(&config_value)
        .bind(existing.enabled)
        .execute(&self.pool)
        .await?;

        Ok(Some(existing))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notification_channels WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, page: PageParams) -> Result<(Vec<NotificationChannel>, i64)> {
        let total: i64 = sqlx::query("SELECT count(*) AS count FROM notification_channels")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;

        let rows = sqlx::query(
            "SELECT id, name, type, config, enabled FROM notification_channels ORDER BY name \
             OFFSET $1 LIMIT $2",
        )
        .bind(page.offset())
        .bind(page.limit())
        .fetch_all(&self.pool)
        .await?;

        let channels = rows.into_iter().map(Self::row_to_channel).collect::<Result<Vec<_>>>()?;
        Ok((channels, total))
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<NotificationChannel>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, name, type, config, enabled FROM notification_channels \
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_channel).collect()
    }
}
