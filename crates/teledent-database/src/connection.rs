//! 数据库连接管理

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use teledent_core::{Result, TeledentError};

/// 数据库连接池
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// 建立连接池，每个请求从池中借用一个连接
    pub async fn new(url: &str, max_connections: u32, acquire_timeout_secs: u64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| TeledentError::Database(e.to_string()))?;

        tracing::info!("Database connection pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
