//! Audit domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Actor recorded for events raised before authentication succeeded
pub const UNKNOWN_ACTOR: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditEventKind {
    LoginSuccess,
    LoginFailure,
    LockoutTriggered,
    SessionExpired,
    UnauthorizedAccessAttempt,
    PasswordChanged,
    UserModified,
    UserCreated,
    Logout,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::LoginSuccess => "login-success",
            AuditEventKind::LoginFailure => "login-failure",
            AuditEventKind::LockoutTriggered => "lockout-triggered",
            AuditEventKind::SessionExpired => "session-expired",
            AuditEventKind::UnauthorizedAccessAttempt => "unauthorized-access-attempt",
            AuditEventKind::PasswordChanged => "password-changed",
            AuditEventKind::UserModified => "user-modified",
            AuditEventKind::UserCreated => "user-created",
            AuditEventKind::Logout => "logout",
        }
    }

    /// Events an operator should look at
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            AuditEventKind::LockoutTriggered | AuditEventKind::UnauthorizedAccessAttempt
        )
    }
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login-success" => Ok(AuditEventKind::LoginSuccess),
            "login-failure" => Ok(AuditEventKind::LoginFailure),
            "lockout-triggered" => Ok(AuditEventKind::LockoutTriggered),
            "session-expired" => Ok(AuditEventKind::SessionExpired),
            "unauthorized-access-attempt" => Ok(AuditEventKind::UnauthorizedAccessAttempt),
            "password-changed" => Ok(AuditEventKind::PasswordChanged),
            "user-modified" => Ok(AuditEventKind::UserModified),
            "user-created" => Ok(AuditEventKind::UserCreated),
            "logout" => Ok(AuditEventKind::Logout),
            other => Err(format!("unknown audit event kind: {}", other)),
        }
    }
}

/// Audit log entry. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub actor: String,
    pub kind: AuditEventKind,
    /// Affected identity, country or resource
    pub target: Option<String>,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, actor: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at,
            actor: actor.into(),
            kind,
            target: None,
            detail: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Audit log filters
#[derive(Debug, Default, Deserialize)]
pub struct AuditFilter {
    pub actor: Option<String>,
    pub kind: Option<AuditEventKind>,
    pub target: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.actor.as_ref().map_or(true, |a| *a == event.actor)
            && self.kind.map_or(true, |k| k == event.kind)
            && self
                .target
                .as_ref()
                .map_or(true, |t| event.target.as_deref() == Some(t.as_str()))
            && self.since.map_or(true, |s| event.occurred_at >= s)
            && self.until.map_or(true, |u| event.occurred_at <= u)
    }
}
