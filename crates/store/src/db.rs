use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use vane_core::config::DurableConfig;

/// Create a PostgreSQL connection pool and ensure the schema exists.
/// Returns None if the durable store is not configured or unreachable.
pub async fn init_pg_pool(config: &DurableConfig) -> Option<PgPool> {
    if !config.is_configured() {
        warn!("DURABLE_URL not configured — durable store disabled");
        return None;
    }

    match PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
    {
        Ok(pool) => {
            info!("PostgreSQL connected");
            match ensure_schema(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    warn!("failed to ensure schema: {} — durable store disabled", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("failed to connect to PostgreSQL: {} — durable store disabled", e);
            None
        }
    }
}

/// Apply the idempotent DDL batch.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("schema.sql")).execute(pool).await?;
    info!("durable schema ensured");
    Ok(())
}
