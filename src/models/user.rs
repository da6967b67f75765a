//! User domain models

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::role::Role;

static IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,64}$").expect("identity regex is valid"));

/// Canonical form of a login handle: trimmed, lower-case
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Country names compare case-insensitively
pub fn same_country(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// User account. Never deleted, only deactivated.
#[derive(Debug, Clone)]
pub struct User {
    pub identity: String,
    pub password_hash: String,
    pub role: Role,
    /// `None` only for master users
    pub assigned_country: Option<String>,
    pub full_name: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    pub fn can_access_country(&self, country: &str) -> bool {
        match self.role {
            Role::MasterUser => true,
            _ => self
                .assigned_country
                .as_deref()
                .is_some_and(|assigned| same_country(assigned, country)),
        }
    }

    /// Role/country pairing invariant
    pub fn check_assignment(role: Role, country: Option<&str>) -> Result<(), String> {
        match (role.requires_country(), country.map(str::trim)) {
            (true, None) | (true, Some("")) => {
                Err(format!("role {} requires an assigned country", role))
            }
            (false, Some(c)) if !c.is_empty() => {
                Err("master users cannot be pinned to a country".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Atomic field change applied by the credential store
#[derive(Debug, Clone)]
pub enum UserChange {
    PasswordHash(String),
    Role(Role),
    Country(Option<String>),
    Active(bool),
    LockedUntil(Option<DateTime<Utc>>),
    LastLogin(DateTime<Utc>),
}

impl UserChange {
    pub fn is_reactivation(&self) -> bool {
        matches!(self, UserChange::Active(true))
    }

    /// Changes after which existing sessions carry stale credentials or scope
    pub fn invalidates_sessions(&self) -> bool {
        matches!(
            self,
            UserChange::PasswordHash(_)
                | UserChange::Role(_)
                | UserChange::Country(_)
                | UserChange::Active(false)
        )
    }

    /// Apply to a record, keeping the role/country invariant
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) -> Result<(), String> {
        match self {
            UserChange::PasswordHash(hash) => user.password_hash = hash.clone(),
            UserChange::Role(role) => {
                // promotion to master drops the country pin
                let country = if role.requires_country() {
                    user.assigned_country.clone()
                } else {
                    None
                };
                User::check_assignment(*role, country.as_deref())?;
                user.role = *role;
                user.assigned_country = country;
            }
            UserChange::Country(country) => {
                let country = country
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string);
                User::check_assignment(user.role, country.as_deref())?;
                user.assigned_country = country;
            }
            UserChange::Active(active) => user.is_active = *active,
            UserChange::LockedUntil(until) => user.locked_until = *until,
            UserChange::LastLogin(at) => user.last_login_at = Some(*at),
        }
        user.updated_at = now;
        Ok(())
    }
}

/// Field change requested by an administrator
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum AdminChange {
    Password(Secret<String>),
    Role(Role),
    Country(Option<String>),
    Active(bool),
    Unlock,
}

impl AdminChange {
    pub fn field(&self) -> &'static str {
        match self {
            AdminChange::Password(_) => "password",
            AdminChange::Role(_) => "role",
            AdminChange::Country(_) => "country",
            AdminChange::Active(_) => "active",
            AdminChange::Unlock => "unlock",
        }
    }
}

/// Create user request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(regex(path = *IDENTITY_RE, message = "3-64 characters: letters, digits, _ . -"))]
    pub username: String,
    pub password: Secret<String>,
    pub role: Role,
    pub assigned_country: Option<String>,
    #[validate(length(max = 128))]
    #[serde(default)]
    pub full_name: String,
    #[validate(email)]
    pub email: Option<String>,
}

/// Change own password request
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: Secret<String>,
    pub new_password: Secret<String>,
}

/// User response (no password hash)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub username: String,
    pub role: Role,
    pub role_name: &'static str,
    pub assigned_country: Option<String>,
    pub full_name: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.identity,
            role: user.role,
            role_name: user.role.display_name(),
            assigned_country: user.assigned_country,
            full_name: user.full_name,
            email: user.email,
            is_active: user.is_active,
            locked_until: user.locked_until,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}
