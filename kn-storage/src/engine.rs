//! Connection pool and migration bootstrap.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::StorageConfig;
use crate::errors::StorageResult;

#[derive(Clone)]
pub struct LocalStorageEngine {
    pool: SqlitePool,
}

impl LocalStorageEngine {
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        let engine = Self { pool };
        engine.run_migrations().await?;
        Ok(engine)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("local storage migrations completed");
        Ok(())
    }
}
