//! Authentication and access-check DTOs

use chrono::{DateTime, Utc};
use secrecy::Secret;
use serde::{Deserialize, Serialize};

use super::{access::Action, role::Role};

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: Secret<String>,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: super::user::UserResponse,
}

/// Authenticated data request
#[derive(Debug, Deserialize)]
pub struct AccessCheckRequest {
    /// `None` asks for every country at once
    pub country: Option<String>,
    pub action: Action,
}

/// Granted access; the session expiry already slid forward
#[derive(Debug, Serialize)]
pub struct AccessCheckResponse {
    pub decision: &'static str,
    pub country: Option<String>,
    pub action: Action,
    pub session_expires_at: DateTime<Utc>,
}

/// Current identity as seen by the gate
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub username: String,
    pub role: Role,
    pub role_name: &'static str,
    pub country: Option<String>,
    pub allowed_countries: Vec<String>,
    pub allowed_actions: Vec<Action>,
    pub session_expires_at: DateTime<Utc>,
}
