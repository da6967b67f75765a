//! 认证相关的 HTTP 处理器

use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::{
    auth::SessionContext,
    error::AppError,
    middleware::{client_ip, AppState},
    models::{
        auth::{LoginRequest, LoginResponse},
        user::{ChangePasswordRequest, UserResponse},
    },
};

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ip = client_ip(&headers, state.config.security.trust_proxy);
    tracing::debug!(client_ip = %ip, "Login attempt");

    let success = state
        .auth_service
        .login(&req.username, &req.password)
        .await?;

    Ok(Json(LoginResponse {
        session_token: success.issued.token,
        expires_at: success.issued.session.expires_at,
        user: UserResponse::from(success.user),
    }))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.logout(&ctx.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.auth_service.me(&ctx.session)))
}

/// PUT /api/v1/auth/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .change_own_password(&ctx.session, &req.old_password, &req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
