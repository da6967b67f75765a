//! 健康检查处理器

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    db,
    middleware::AppState,
};

/// 存活探针响应
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub active_sessions: usize,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (store, database) = match &state.db {
        Some(pool) => ("postgres", Some(db::health_check(pool).await.describe())),
        None => ("memory", None),
    };

    let status = match &database {
        Some(d) if d.starts_with("unhealthy") => "degraded",
        _ => "ok",
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store,
        database,
        active_sessions: state.sessions.len(),
    })
}
