//! Periodic reclamation of expired sessions and stale lockout records.
//! Expiry is decided lazily at access time; this only frees memory.

use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};

use crate::clock::Clock;

use super::{LoginAttemptTracker, SessionManager};

/// One sweep pass; returns (sessions, tracker records) removed
pub fn sweep_once(
    sessions: &SessionManager,
    tracker: &LoginAttemptTracker,
    clock: &dyn Clock,
) -> (usize, usize) {
    let sessions_removed = sessions.purge_expired();
    let records_removed = tracker.purge_stale(clock.now());

    if sessions_removed > 0 || records_removed > 0 {
        tracing::debug!(
            sessions = sessions_removed,
            lockout_records = records_removed,
            "Sweep reclaimed expired entries"
        );
    }
    metrics::gauge!("sessions_active").set(sessions.len() as f64);

    (sessions_removed, records_removed)
}

/// Run `sweep_once` every `interval` until `shutdown` flips to true
pub fn spawn_sweeper(
    interval: Duration,
    sessions: Arc<SessionManager>,
    tracker: Arc<LoginAttemptTracker>,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;

        tracing::info!(interval_secs = interval.as_secs(), "Sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_once(&sessions, &tracker, clock.as_ref());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        models::{Role, User},
        services::LockoutPolicy,
    };
    use chrono::Utc;

    #[test]
    fn test_sweep_once() {
        let clock = Arc::new(ManualClock::default());
        let sessions = SessionManager::new(chrono::Duration::minutes(30), clock.clone());
        let tracker = LoginAttemptTracker::new(LockoutPolicy::default());

        let now = Utc::now();
        sessions.create(&User {
            identity: "viewer1".to_string(),
            password_hash: String::new(),
            role: Role::Viewer,
            assigned_country: Some("Lesotho".to_string()),
            full_name: String::new(),
            email: None,
            is_active: true,
            locked_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        });
        tracker.record_failure("ghost", clock.now());

        assert_eq!(sweep_once(&sessions, &tracker, clock.as_ref()), (0, 0));

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(sweep_once(&sessions, &tracker, clock.as_ref()), (1, 1));
    }
}
