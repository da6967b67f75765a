//! 登录锁定集成测试

mod common;

use common::{secret, TestApp, PASSWORD};
use chrono::Duration;
use dashboard_access::{
    clock::Clock,
    error::AppError,
    models::{AdminChange, AuditEventKind},
};

async fn fail_login(app: &TestApp, username: &str) -> AppError {
    app.state
        .auth_service
        .login(username, &secret("wrong-password"))
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_fifth_failure_locks_account() {
    let app = TestApp::new().await;
    let start = app.clock.now();

    for _ in 0..4 {
        assert!(matches!(
            fail_login(&app, "analyst1").await,
            AppError::InvalidCredentials
        ));
    }

    match fail_login(&app, "analyst1").await {
        AppError::AccountLocked { locked_until } => {
            assert_eq!(locked_until, start + Duration::minutes(15));
        }
        other => panic!("expected AccountLocked, got {:?}", other),
    }

    assert_eq!(app.audit.count_kind(AuditEventKind::LockoutTriggered).await, 1);
    assert_eq!(app.audit.count_kind(AuditEventKind::LoginFailure).await, 5);
}

#[tokio::test]
async fn test_correct_password_rejected_while_locked() {
    let app = TestApp::new().await;
    for _ in 0..5 {
        fail_login(&app, "analyst1").await;
    }

    app.advance_minutes(14);
    let result = app
        .state
        .auth_service
        .login("analyst1", &secret(PASSWORD))
        .await;
    assert!(matches!(result, Err(AppError::AccountLocked { .. })));
}

#[tokio::test]
async fn test_lock_expires_after_duration() {
    let app = TestApp::new().await;
    for _ in 0..5 {
        fail_login(&app, "analyst1").await;
    }
    assert!(app.user("analyst1").await.locked_until.is_some());

    app.advance_minutes(15);
    app.login("analyst1").await;

    // the persisted mirror is cleared on the next successful login
    let user = app.user("analyst1").await;
    assert!(user.locked_until.is_none());
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let app = TestApp::new().await;

    for _ in 0..4 {
        fail_login(&app, "viewer1").await;
    }
    app.login("viewer1").await;

    for _ in 0..4 {
        assert!(matches!(
            fail_login(&app, "viewer1").await,
            AppError::InvalidCredentials
        ));
    }
}

#[tokio::test]
async fn test_failures_outside_window_do_not_count() {
    let app = TestApp::new().await;

    for _ in 0..4 {
        fail_login(&app, "viewer1").await;
    }
    app.advance_minutes(16);

    assert!(matches!(
        fail_login(&app, "viewer1").await,
        AppError::InvalidCredentials
    ));
}

#[tokio::test]
async fn test_unknown_identity_is_tracked_like_a_real_one() {
    let app = TestApp::new().await;

    for _ in 0..4 {
        assert!(matches!(
            fail_login(&app, "nobody").await,
            AppError::InvalidCredentials
        ));
    }
    assert!(matches!(
        fail_login(&app, "nobody").await,
        AppError::AccountLocked { .. }
    ));
}

#[tokio::test]
async fn test_identity_is_case_insensitive_for_lockout() {
    let app = TestApp::new().await;

    for name in ["Analyst1", "ANALYST1", " analyst1 ", "analyst1", "AnAlYsT1"] {
        fail_login(&app, name).await;
    }

    let result = app
        .state
        .auth_service
        .login("analyst1", &secret(PASSWORD))
        .await;
    assert!(matches!(result, Err(AppError::AccountLocked { .. })));
}

#[tokio::test]
async fn test_admin_unlock_clears_lock() {
    let app = TestApp::new().await;
    let admin = app.login("uganda_admin").await;

    for _ in 0..5 {
        fail_login(&app, "analyst1").await;
    }

    let unlocked = app
        .state
        .admin_service
        .unlock(&admin.session, "analyst1")
        .await
        .unwrap();
    assert!(unlocked.locked_until.is_none());

    app.login("analyst1").await;
}

#[tokio::test]
async fn test_inactive_account_reports_inactive_only_with_correct_password() {
    let app = TestApp::new().await;
    let admin = app.login("admin").await;

    app.state
        .admin_service
        .modify_user(&admin.session, "viewer1", AdminChange::Active(false))
        .await
        .unwrap();

    assert!(matches!(
        fail_login(&app, "viewer1").await,
        AppError::InvalidCredentials
    ));

    let result = app
        .state
        .auth_service
        .login("viewer1", &secret(PASSWORD))
        .await;
    assert!(matches!(result, Err(AppError::AccountInactive)));
    assert_eq!(app.state.sessions.count_for("viewer1"), 0);
}

#[tokio::test]
async fn test_failed_unlock_keeps_tracker_lock() {
    let app = TestApp::new().await;
    let admin = app.login("admin").await;

    for _ in 0..5 {
        fail_login(&app, "analyst1").await;
    }
    app.state
        .admin_service
        .modify_user(&admin.session, "analyst1", AdminChange::Active(false))
        .await
        .unwrap();

    let result = app
        .state
        .admin_service
        .unlock(&admin.session, "analyst1")
        .await;
    assert!(matches!(result, Err(AppError::AccountInactive)));

    // the store rejected the change, so the in-memory lock stays
    assert!(app
        .state
        .tracker
        .check("analyst1", app.clock.now())
        .is_err());
}
