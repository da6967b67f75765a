//! Login-attempt tracker
//! Per-identity failure window and lockout state: Clear → Accumulating → Locked → Clear

use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::VecDeque;

use crate::config::SecurityConfig;

/// Threshold and timing of the lockout rule
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub attempt_window: Duration,
    pub lockout_duration: Duration,
}

impl LockoutPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            max_attempts: config.max_login_attempts,
            attempt_window: config.attempt_window(),
            lockout_duration: config.lockout_duration(),
        }
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_window: Duration::minutes(15),
            lockout_duration: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Default)]
struct AttemptRecord {
    failures: VecDeque<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    /// Lock still in force at `now`; an elapsed lock resets the record
    fn active_lock(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.locked_until {
            Some(until) if now < until => Some(until),
            Some(_) => {
                self.locked_until = None;
                self.failures.clear();
                None
            }
            None => None,
        }
    }

    fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        let cutoff = now - window;
        while self.failures.front().is_some_and(|t| *t <= cutoff) {
            self.failures.pop_front();
        }
    }

    fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let lock_over = self.locked_until.map_or(true, |until| now >= until);
        let window_over = self
            .failures
            .back()
            .map_or(true, |last| *last <= now - window);
        lock_over && window_over
    }
}

/// Observable tracker state for one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Clear,
    Accumulating { failures: u32 },
    Locked { until: DateTime<Utc> },
}

/// Result of recording one failed login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Accumulating { failures: u32, remaining: u32 },
    /// This failure reached the threshold
    LockoutTriggered { until: DateTime<Utc> },
    /// Already locked; the counter is not consumed
    AlreadyLocked { until: DateTime<Utc> },
}

/// Failure counter keyed by normalized identity.
/// Each record is mutated only under its map entry lock.
pub struct LoginAttemptTracker {
    policy: LockoutPolicy,
    records: DashMap<String, AttemptRecord>,
}

impl LoginAttemptTracker {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            records: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Pre-verification gate. Returns the lock expiry when the identity is locked.
    pub fn check(&self, identity: &str, now: DateTime<Utc>) -> Result<(), DateTime<Utc>> {
        let Some(mut record) = self.records.get_mut(identity) else {
            return Ok(());
        };

        match record.active_lock(now) {
            Some(until) => Err(until),
            None => Ok(()),
        }
    }

    pub fn record_failure(&self, identity: &str, now: DateTime<Utc>) -> FailureOutcome {
        let mut record = self.records.entry(identity.to_string()).or_default();

        if let Some(until) = record.active_lock(now) {
            return FailureOutcome::AlreadyLocked { until };
        }

        record.prune(now, self.policy.attempt_window);
        record.failures.push_back(now);

        let failures = record.failures.len() as u32;
        if failures >= self.policy.max_attempts {
            let until = now + self.policy.lockout_duration;
            record.locked_until = Some(until);
            record.failures.clear();
            tracing::warn!(
                identity = %identity,
                failures = failures,
                locked_until = %until,
                "Login lockout triggered"
            );
            return FailureOutcome::LockoutTriggered { until };
        }

        FailureOutcome::Accumulating {
            failures,
            remaining: self.policy.max_attempts - failures,
        }
    }

    /// Apply a verified password. Fails with the lock expiry when a lock landed
    /// while the password was being verified; otherwise clears the record.
    pub fn record_success(&self, identity: &str, now: DateTime<Utc>) -> Result<(), DateTime<Utc>> {
        match self.records.entry(identity.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Some(until) = entry.get_mut().active_lock(now) {
                    return Err(until);
                }
                entry.remove();
                Ok(())
            }
            Entry::Vacant(_) => Ok(()),
        }
    }

    pub fn state(&self, identity: &str, now: DateTime<Utc>) -> AttemptState {
        let Some(record) = self.records.get(identity) else {
            return AttemptState::Clear;
        };

        if let Some(until) = record.locked_until.filter(|until| now < *until) {
            return AttemptState::Locked { until };
        }
        if record.locked_until.is_some() {
            return AttemptState::Clear;
        }

        let cutoff = now - self.policy.attempt_window;
        let failures = record.failures.iter().filter(|t| **t > cutoff).count() as u32;
        if failures == 0 {
            AttemptState::Clear
        } else {
            AttemptState::Accumulating { failures }
        }
    }

    /// Administrative unlock
    pub fn reset(&self, identity: &str) {
        self.records.remove(identity);
    }

    /// Drop records whose lock and failure window have both elapsed
    pub fn purge_stale(&self, now: DateTime<Utc>) -> usize {
        let window = self.policy.attempt_window;
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_stale(now, window));
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
