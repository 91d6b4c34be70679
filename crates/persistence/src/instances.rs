use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use fleet_common::{InstanceStatus, Result};

use crate::models::Instance;

/// Read-only access to the instance directory (spec.md §3: instances are
/// owned by the external lifecycle service; core only reads them).
#[async_trait]
pub trait InstanceRepo: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Instance>>;
    async fn get(&self, id: Uuid) -> Result<Option<Instance>>;
}

pub struct PgInstanceRepo {
    pool: PgPool,
}

impl PgInstanceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstanceRepo for PgInstanceRepo {
    async fn list_all(&self) -> Result<Vec<Instance>> {
        let rows = sqlx::query("SELECT id, name, status FROM instances ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                Ok(Instance {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    status: InstanceStatus::from_str(&status)
                        .unwrap_or(InstanceStatus::Unknown),
                })
            })
            .collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Instance>> {
        let row = sqlx::query("SELECT id, name, status FROM instances WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => {
                let status: String = row.try_get("status")?;
                Some(Instance {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    status: InstanceStatus::from_str(&status)
                        .unwrap_or(InstanceStatus::Unknown),
                })
            }
            None => None,
        })
    }
}
