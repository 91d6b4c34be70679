use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use fleet_common::Result;

/// Builds the single bounded connection pool shared across every component
/// (spec.md §5: "Database access MUST use a bounded connection pool shared
/// across all components").
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}
