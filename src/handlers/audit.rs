//! 审计日志 HTTP 处理器

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    auth::SessionContext,
    error::AppError,
    middleware::AppState,
    models::{Action, AuditFilter},
};

/// GET /api/v1/audit/events
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Query(filter): Query<AuditFilter>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .check(&ctx.session, None, Action::ReadAuditLog)
        .await
        .into_result()?;

    let events = state.audit_service.query(&filter).await?;

    Ok(Json(json!({
        "count": events.len(),
        "limit": filter.effective_limit(),
        "events": events,
    })))
}
