//! Session domain model

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::role::Role;

/// Authenticated session, keyed in the session table by `token_hash`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    #[serde(skip)]
    pub token_hash: String,
    pub identity: String,
    /// Role snapshot at issue time
    pub role: Role,
    /// Country snapshot at issue time; `None` for master users
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Short token fingerprint, safe to log
    pub fn fingerprint(&self) -> &str {
        let end = self.token_hash.len().min(12);
        &self.token_hash[..end]
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A freshly created session together with the bearer token handed to the client.
/// The plain token is never stored.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: Session,
}
