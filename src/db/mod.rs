use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::errors::{IndexerError, Result};

pub const DB_MAX_CONNECTIONS: u32 = 20;
const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared Postgres pool. Chain tasks hold it through an `Arc` and use it
/// concurrently.
#[derive(Debug)]
pub struct DbConnection {
    pub pool: Pool<Postgres>,
}

impl DbConnection {
    pub async fn new(db_conn_string: String) -> Result<Arc<Self>> {
        let conn_options: PgConnectOptions = db_conn_string
            .parse()
            .map_err(|e| IndexerError::configuration("db_conn_string", format!("{e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(DB_MAX_CONNECTIONS)
            .acquire_timeout(DB_ACQUIRE_TIMEOUT)
            .connect_with(conn_options)
            .await?;

        Ok(Arc::new(Self { pool }))
    }

    /// Applies the embedded migrations under `migrations/`
    pub async fn migrate(&self) -> Result<()> {
        info!("[db] Running migrations");
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub async fn check_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
