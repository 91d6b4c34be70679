use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use fleet_common::Result;

use crate::models::SecuritySummary;

/// Read-side summary over the secret/vulnerability/SSH-key lifecycle
/// (spec.md §4.5, §3: Secret/Vulnerability/BomEntry/SshKey).
#[async_trait]
pub trait SecurityRepo: Send + Sync {
    async fn summary(&self) -> Result<SecuritySummary>;
}

pub struct PgSecurityRepo {
    pool: PgPool,
}

impl PgSecurityRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecurityRepo for PgSecurityRepo {
    async fn summary(&self) -> Result<SecuritySummary> {
        let critical_vulnerabilities: i64 = sqlx::query(
            "SELECT count(*) AS count FROM vulnerabilities WHERE severity = 'CRITICAL'",
        )
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;

        let overdue_secrets: i64 = sqlx::query(
            "SELECT count(*) AS count FROM secrets WHERE expires_at IS NOT NULL \
             AND expires_at <= $1",
        )
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;

        let revoked_keys: i64 = sqlx::query("SELECT count(*) AS count FROM ssh_keys WHERE revoked = true")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;

        Ok(SecuritySummary {
            critical_vulnerabilities,
            overdue_secrets,
            revoked_keys,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewSecret {
    pub instance_id: Option<Uuid>,
    pub name: String,
    pub secret_type: String,
    pub value_ciphertext: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct SecretUpdate {
    pub name: Option<String>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// Secret vault access. Plaintext is never persisted (spec.md §3); the
/// ciphertext column round-trips through an external KMS/envelope-encryption
/// boundary that is out of scope for the core (spec.md §1).
#[async_trait]
pub trait SecretRepo: Send + Sync {
    async fn create(&self, secret: NewSecret) -> Result<crate::models::Secret>;
    async fn get(&self, id: Uuid) -> Result<Option<crate::models::Secret>>;
    async fn update(&self, id: Uuid, update: SecretUpdate) -> Result<Option<crate::models::Secret>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn list_for_instance(&self, instance_id: Uuid) -> Result<Vec<crate::models::Secret>>;
    /// Rotates the stored ciphertext, bumping `last_rotated_at` to now.
    async fn rotate(&self, id: Uuid, value_ciphertext: String) -> Result<Option<crate::models::Secret>>;
    /// Role-gated reveal (spec.md §3). Returns the ciphertext; decrypting it
    /// is an external boundary the core does not perform.
    async fn reveal(&self, id: Uuid) -> Result<Option<crate::models::RevealedSecret>>;
}

pub struct PgSecretRepo {
    pool: PgPool,
}

impl PgSecretRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    const SELECT_COLUMNS: &'static str =
        "id, instance_id, name, type, value_ciphertext, created_at, last_rotated_at, expires_at";

    fn row_to_secret(row: sqlx::postgres::PgRow) -> Result<crate::models::Secret> {
        Ok(crate::models::Secret {
            id: row.try_get("id")?,
            instance_id: row.try_get("instance_id")?,
            name: row.try_get("name")?,
            secret_type: row.try_get("type")?,
            value_ciphertext: row.try_get("value_ciphertext")?,
            created_at: row.try_get("created_at")?,
            last_rotated_at: row.try_get("last_rotated_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

#[async_trait]
impl SecretRepo for PgSecretRepo {
    async fn create(&self, secret: NewSecret) -> Result<crate::models::Secret> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO secrets (id, instance_id, name, type, value_ciphertext, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(secret.instance_id)
        .bind(&secret.name)
        .bind(&secret.secret_type)
        .bind(&secret.value_ciphertext)
        .bind(created_at)
        .bind(secret.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(crate::models::Secret {
            id,
            instance_id: secret.instance_id,
            name: secret.name,
            secret_type: secret.secret_type,
            value_ciphertext: secret.value_ciphertext,
            created_at,
            last_rotated_at: None,
            expires_at: secret.expires_at,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<crate::models::Secret>> {
        let row = sqlx::query(&format!("SELECT {} FROM secrets WHERE id = $1", Self::SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_secret).transpose()
    }

    async fn update(&self, id: Uuid, update: SecretUpdate) -> Result<Option<crate::models::Secret>> {
        if let Some(name) = &update.name {
            sqlx::query("UPDATE secrets SET name = $2 WHERE id = $1").bind(id).bind(name).execute(&self.pool).await?;
        }
        if let Some(expires_at) = update.expires_at {
            sqlx::query("UPDATE secrets SET expires_at = $2 WHERE id = $1")
                .bind(id)
                .bind(expires_at)
                .execute(&self.pool)
                .await?;
        }
        self.get(id).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM secrets WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_instance(&self, instance_id: Uuid) -> Result<Vec<crate::models::Secret>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM secrets WHERE instance_id = $1 ORDER BY name",
            Self::SELECT_COLUMNS
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_secret).collect()
    }

    async fn rotate(&self, id: Uuid, value_ciphertext: String) -> Result<Option<crate::models::Secret>> {
        sqlx::query("UPDATE secrets SET value_ciphertext = $2, last_rotated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(&value_ciphertext)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        self.get(id).await
    }

    async fn reveal(&self, id: Uuid) -> Result<Option<crate::models::RevealedSecret>> {
        let row = sqlx::query("SELECT id, name, value_ciphertext FROM secrets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(crate::models::RevealedSecret {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            value_ciphertext: row.try_get("value_ciphertext")?,
        }))
    }
}
