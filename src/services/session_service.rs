//! Session manager: issue, validate (sliding expiry), invalidate

use chrono::Duration;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    auth::token::SessionToken,
    clock::Clock,
    error::AppError,
    models::{IssuedSession, Session, User},
};

/// Why a presented token was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session existed but sat idle past its expiry; it has been evicted
    #[error("session for {identity} expired")]
    Expired { identity: String },

    #[error("session not found")]
    NotFound,
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Expired { .. } => AppError::SessionExpired,
            SessionError::NotFound => AppError::SessionNotFound,
        }
    }
}

/// Owner of the session table. Keyed by token hash; each entry is only
/// mutated under its map entry lock, so logout and validation cannot interleave.
///
/// Issuing a session and revoking an identity's sessions after a credential
/// change both happen under [`SessionManager::lock_identity`].
pub struct SessionManager {
    sessions: DashMap<String, Session>,
    identity_locks: DashMap<String, Arc<Mutex<()>>>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            identity_locks: DashMap::new(),
            timeout,
            clock,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Per-identity critical section. Held across the credential re-read and
    /// `create` on login, and across the store update and `invalidate_all` on
    /// admin changes, so no session can be issued from a superseded record.
    pub async fn lock_identity(&self, identity: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .identity_locks
            .entry(identity.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Issue a session with a role/country snapshot of `user`
    pub fn create(&self, user: &User) -> IssuedSession {
        let now = self.clock.now();

        loop {
            let token = SessionToken::generate();
            let token_hash = SessionToken::hash(&token);

            // 256-bit tokens; the retry only guards the map invariant
            let Entry::Vacant(slot) = self.sessions.entry(token_hash.clone()) else {
                continue;
            };

            let session = Session {
                token_hash,
                identity: user.identity.clone(),
                role: user.role,
                country: user.assigned_country.clone(),
                created_at: now,
                last_activity_at: now,
                expires_at: now + self.timeout,
            };
            slot.insert(session.clone());

            tracing::debug!(
                identity = %session.identity,
                session = %session.fingerprint(),
                expires_at = %session.expires_at,
                "Session created"
            );

            return IssuedSession { token, session };
        }
    }

    /// Validate a bearer token and slide its expiry forward
    pub fn validate(&self, token: &str) -> Result<Session, SessionError> {
        let now = self.clock.now();

        match self.sessions.entry(SessionToken::hash(token)) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired_at(now) {
                    let (_, session) = entry.remove_entry();
                    tracing::debug!(
                        identity = %session.identity,
                        session = %session.fingerprint(),
                        "Session expired"
                    );
                    return Err(SessionError::Expired {
                        identity: session.identity,
                    });
                }

                let session = entry.get_mut();
                session.last_activity_at = now;
                session.expires_at = now + self.timeout;
                Ok(session.clone())
            }
            Entry::Vacant(_) => Err(SessionError::NotFound),
        }
    }

    /// Explicit logout
    pub fn invalidate(&self, token: &str) -> Option<Session> {
        self.sessions
            .remove(&SessionToken::hash(token))
            .map(|(_, session)| session)
    }

    /// Remove every session of `identity`
    pub fn invalidate_all(&self, identity: &str) -> usize {
        self.remove_where(|session| session.identity == identity)
    }

    /// Remove every session of `identity` except the one keyed by `keep_hash`
    pub fn invalidate_all_except(&self, identity: &str, keep_hash: &str) -> usize {
        self.remove_where(|session| session.identity == identity && session.token_hash != keep_hash)
    }

    /// Reclaim memory held by expired sessions and idle identity locks
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        // a lock nobody holds or waits on is only referenced by the map
        self.identity_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        self.remove_where(|session| session.is_expired_at(now))
    }

    fn remove_where(&self, pred: impl Fn(&Session) -> bool) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !pred(session));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(removed = removed, "Sessions removed");
        }
        removed
    }

    pub fn count_for(&self, identity: &str) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.value().identity == identity)
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
