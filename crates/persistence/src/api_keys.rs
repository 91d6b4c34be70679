use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use fleet_common::{Result, Role};

use crate::models::ApiKeyRecord;

#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    pub user_id: Uuid,
    pub role: Role,
    pub api_key_id: Uuid,
}

#[async_trait]
pub trait ApiKeyRepo: Send + Sync {
    /// Looks up a key by its SHA-256 hash. Returns `None` for unknown or
    /// expired keys (spec.md §3: "Expired keys MUST NOT authenticate").
    async fn find_by_hash(&self, hash: &str) -> Result<Option<ApiKeyRecord>>;
    async fn role_for_user(&self, user_id: Uuid) -> Result<Option<Role>>;
}

pub struct PgApiKeyRepo {
    pool: PgPool,
}

impl PgApiKeyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepo for PgApiKeyRepo {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query(
            "SELECT id, owner_user_id, hash, expires_at FROM api_keys WHERE hash = $1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: Option<chrono::DateTime<Utc>> = row.try_get("expires_at")?;
        if let Some(expires_at) = expires_at {
            if expires_at <= Utc::now() {
                return Ok(None);
            }
        }

        Ok(Some(ApiKeyRecord {
            id: row.try_get("id")?,
            owner_user_id: row.try_get("owner_user_id")?,
            hash: row.try_get("hash")?,
            expires_at,
        }))
    }

    async fn role_for_user(&self, user_id: Uuid) -> Result<Option<Role>> {
        let row = sqlx::query("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => {
                let role: String = row.try_get("role")?;
                role.parse::<Role>().ok()
            }
            None => None,
        })
    }
}
