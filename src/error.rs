//! Unified error model
//! Every failure the gate can report, and how it maps onto HTTP

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::repository::StoreError;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Unknown identity or wrong password; the two are never told apart
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked until {locked_until}")]
    AccountLocked { locked_until: DateTime<Utc> },

    #[error("Account inactive")]
    AccountInactive,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Requested country is outside the session's scope")]
    CountryScopeViolation,

    #[error("Access denied")]
    Forbidden,

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Resource not found")]
    NotFound,

    #[error("Password must be at least {min_length} characters")]
    WeakPassword { min_length: usize },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::SessionExpired | AppError::SessionNotFound => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AccountLocked { .. } => StatusCode::LOCKED,
            AppError::AccountInactive
            | AppError::CountryScopeViolation
            | AppError::Forbidden
            | AppError::PolicyViolation(_) => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::WeakPassword { .. } | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable kind, lets clients tell re-login from denial
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::AccountLocked { .. } => "account_locked",
            AppError::AccountInactive => "account_inactive",
            AppError::SessionExpired => "session_expired",
            AppError::SessionNotFound => "session_not_found",
            AppError::CountryScopeViolation => "country_scope_violation",
            AppError::Forbidden => "forbidden",
            AppError::PolicyViolation(_) => "policy_violation",
            AppError::NotFound => "not_found",
            AppError::WeakPassword { .. } => "weak_password",
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => "internal",
        }
    }

    /// User-facing message (no sensitive detail)
    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidCredentials => "Invalid username or password".to_string(),
            AppError::AccountLocked { locked_until } => {
                format!("Account locked. Try again after {}", locked_until.to_rfc3339())
            }
            AppError::AccountInactive => {
                "This account has been deactivated. Contact an administrator".to_string()
            }
            AppError::SessionExpired => "Session expired, please sign in again".to_string(),
            AppError::SessionNotFound => "Please sign in to continue".to_string(),
            AppError::CountryScopeViolation => {
                "You do not have access to data for this country".to_string()
            }
            AppError::Forbidden => "Access denied".to_string(),
            AppError::PolicyViolation(msg) => msg.clone(),
            AppError::NotFound => "Resource not found".to_string(),
            AppError::WeakPassword { min_length } => {
                format!("Password must be at least {} characters", min_length)
            }
            AppError::Validation(msg) => msg.clone(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }

    /// Errors that mean "sign in again" rather than "not allowed"
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, AppError::SessionExpired | AppError::SessionNotFound)
    }
}

/// Error response DTO
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub kind: &'static str,
    pub message: String,
    pub request_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                kind: self.kind(),
                message: self.user_message(),
                request_id,
            },
        };

        if status.is_server_error() {
            tracing::error!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Application error"
            );
        } else {
            tracing::debug!(
                code = self.code(),
                kind = self.kind(),
                request_id = %error_response.error.request_id,
                "Request rejected"
            );
        }

        (status, Json(error_response)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::InactiveUser => AppError::AccountInactive,
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::InvalidAssignment(msg) => AppError::PolicyViolation(msg),
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}
