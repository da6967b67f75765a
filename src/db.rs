//! 凭据库与审计库的 PostgreSQL 连接
//! 仅在配置了数据库地址时使用，否则两个存储都在内存中

use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// 登录与审计依赖的表
pub const REQUIRED_TABLES: [&str; 2] = ["users", "audit_events"];

/// 建立连接池、执行迁移并确认表结构完整
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DbError::MigrationFailed(e.to_string()))?;

    verify_schema(&pool).await?;

    tracing::info!(
        max_connections = config.max_connections,
        tables = ?REQUIRED_TABLES,
        "Credential and audit stores ready"
    );

    Ok(pool)
}

/// 迁移可能被外部回滚，缺表时拒绝启动
async fn verify_schema(pool: &PgPool) -> Result<(), DbError> {
    for table in REQUIRED_TABLES {
        let present: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .fetch_one(pool)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        if !present {
            return Err(DbError::MissingTable(table));
        }
    }
    Ok(())
}

/// 检查凭据表是否可读；登录依赖它
pub async fn health_check(pool: &PgPool) -> HealthStatus {
    metrics::gauge!("db_pool_size").set(pool.size() as f64);
    metrics::gauge!("db_pool_idle").set(pool.num_idle() as f64);

    match sqlx::query("SELECT 1 FROM users LIMIT 1")
        .fetch_optional(pool)
        .await
    {
        Ok(_) => HealthStatus::Healthy,
        Err(e) => {
            tracing::warn!(error = %e, "Credential store unreachable");
            HealthStatus::Unhealthy(e.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Schema incomplete: table {0} is missing")]
    MissingTable(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    /// 健康检查接口中的描述
    pub fn describe(&self) -> String {
        match self {
            HealthStatus::Healthy => "healthy".to_string(),
            HealthStatus::Unhealthy(msg) => format!("unhealthy: {}", msg),
        }
    }
}
