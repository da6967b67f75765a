//! 用户管理的 HTTP 处理器

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    auth::SessionContext,
    error::AppError,
    middleware::AppState,
    models::user::{AdminChange, CreateUserRequest, UserResponse},
};

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
) -> Result<impl IntoResponse, AppError> {
    let users = state.admin_service.manageable_users(&ctx.session).await?;
    let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();

    Ok(Json(json!({
        "count": users.len(),
        "users": users,
    })))
}

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.admin_service.create_user(&ctx.session, req).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /api/v1/users/{identity}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Path(identity): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.admin_service.get_user(&ctx.session, &identity).await?;
    Ok(Json(UserResponse::from(user)))
}

/// PATCH /api/v1/users/{identity}
pub async fn modify_user(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Path(identity): Path<String>,
    Json(change): Json<AdminChange>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .admin_service
        .modify_user(&ctx.session, &identity, change)
        .await?;
    Ok(Json(UserResponse::from(user)))
}

/// POST /api/v1/users/{identity}/unlock
pub async fn unlock_user(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Path(identity): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.admin_service.unlock(&ctx.session, &identity).await?;
    Ok(Json(UserResponse::from(user)))
}
