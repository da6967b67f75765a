//! 会话生命周期集成测试

mod common;

use common::{secret, TestApp, PASSWORD};
use dashboard_access::{
    clock::Clock,
    error::AppError,
    models::{AuditEventKind, Role, UserChange},
    repository::UserStore,
    services::sweeper::sweep_once,
};

#[tokio::test]
async fn test_login_issues_opaque_token() {
    let app = TestApp::new().await;
    let issued = app.login("analyst1").await;

    assert_eq!(issued.token.len(), 64);
    assert!(issued.token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(issued.session.token_hash, issued.token);

    assert_eq!(issued.session.identity, "analyst1");
    assert_eq!(issued.session.role, Role::Analyst);
    assert_eq!(issued.session.country.as_deref(), Some("Uganda"));
    assert_eq!(app.audit.count_kind(AuditEventKind::LoginSuccess).await, 1);
}

#[tokio::test]
async fn test_activity_slides_expiry() {
    let app = TestApp::new().await;
    let issued = app.login("viewer1").await;
    let auth = &app.state.auth_service;

    // three idle gaps under the timeout keep the session alive well past 30 minutes
    for _ in 0..3 {
        app.advance_minutes(29);
        let session = auth.authenticate(&issued.token).await.unwrap();
        assert_eq!(
            session.expires_at,
            session.last_activity_at + chrono::Duration::minutes(30)
        );
    }
}

#[tokio::test]
async fn test_idle_timeout_expires_exactly_at_limit() {
    let app = TestApp::new().await;
    let issued = app.login("viewer1").await;
    let auth = &app.state.auth_service;

    app.advance_minutes(30);
    assert!(matches!(
        auth.authenticate(&issued.token).await,
        Err(AppError::SessionExpired)
    ));
    assert_eq!(app.audit.count_kind(AuditEventKind::SessionExpired).await, 1);

    // the expired entry is gone, not merely flagged
    assert!(matches!(
        auth.authenticate(&issued.token).await,
        Err(AppError::SessionNotFound)
    ));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = TestApp::new().await;
    let issued = app.login("analyst1").await;
    let auth = &app.state.auth_service;

    auth.logout(&issued.token).await.unwrap();
    assert!(matches!(
        auth.authenticate(&issued.token).await,
        Err(AppError::SessionNotFound)
    ));
    assert!(matches!(
        auth.logout(&issued.token).await,
        Err(AppError::SessionNotFound)
    ));
    assert_eq!(app.audit.count_kind(AuditEventKind::Logout).await, 1);
}

#[tokio::test]
async fn test_unknown_token_not_found() {
    let app = TestApp::new().await;
    assert!(matches!(
        app.state.auth_service.authenticate("deadbeef").await,
        Err(AppError::SessionNotFound)
    ));
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let app = TestApp::new().await;
    let first = app.login("analyst1").await;
    let second = app.login("analyst1").await;

    assert_ne!(first.token, second.token);
    assert_eq!(app.state.sessions.count_for("analyst1"), 2);

    app.state.auth_service.logout(&first.token).await.unwrap();
    app.state
        .auth_service
        .authenticate(&second.token)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_session_keeps_login_snapshot() {
    let app = TestApp::new().await;
    let issued = app.login("analyst1").await;

    // a raw store write does not reach live sessions; admin changes invalidate instead
    app.users
        .update(
            "analyst1",
            UserChange::Country(Some("Kenya".to_string())),
            app.clock.now(),
        )
        .await
        .unwrap();

    let session = app
        .state
        .auth_service
        .authenticate(&issued.token)
        .await
        .unwrap();
    assert_eq!(session.role, Role::Analyst);
    assert_eq!(session.country.as_deref(), Some("Uganda"));
}

#[tokio::test]
async fn test_change_own_password_keeps_current_session() {
    let app = TestApp::new().await;
    let current = app.login("analyst1").await;
    let other = app.login("analyst1").await;
    let auth = &app.state.auth_service;

    auth.change_own_password(&current.session, &secret(PASSWORD), &secret("battery-staple"))
        .await
        .unwrap();

    auth.authenticate(&current.token).await.unwrap();
    assert!(matches!(
        auth.authenticate(&other.token).await,
        Err(AppError::SessionNotFound)
    ));

    assert!(matches!(
        auth.login("analyst1", &secret(PASSWORD)).await,
        Err(AppError::InvalidCredentials)
    ));
    auth.login("analyst1", &secret("battery-staple"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_change_own_password_checks_policy_and_old_password() {
    let app = TestApp::new().await;
    let issued = app.login("viewer1").await;
    let auth = &app.state.auth_service;

    assert!(matches!(
        auth.change_own_password(&issued.session, &secret(PASSWORD), &secret("abc"))
            .await,
        Err(AppError::WeakPassword { min_length: 6 })
    ));
    assert!(matches!(
        auth.change_own_password(&issued.session, &secret("not-it"), &secret("long-enough"))
            .await,
        Err(AppError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_sweep_reclaims_expired_sessions() {
    let app = TestApp::new().await;
    app.login("analyst1").await;
    app.login("viewer1").await;
    app.advance_minutes(10);
    let fresh = app.login("admin").await;

    app.advance_minutes(25);
    let (sessions, _) = sweep_once(
        &app.state.sessions,
        &app.state.tracker,
        app.clock.as_ref(),
    );

    assert_eq!(sessions, 2);
    assert_eq!(app.state.sessions.len(), 1);
    app.state
        .auth_service
        .authenticate(&fresh.token)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logout_racing_validation_leaves_no_session() {
    let app = TestApp::new().await;

    let mut tasks = Vec::new();
    for _ in 0..40 {
        let token = app.login("analyst1").await.token;

        let logout = {
            let auth = app.state.auth_service.clone();
            let token = token.clone();
            tokio::spawn(async move { auth.logout(&token).await })
        };
        let validate = {
            let auth = app.state.auth_service.clone();
            let token = token.clone();
            tokio::spawn(async move { auth.authenticate(&token).await })
        };
        tasks.push((token, logout, validate));
    }

    for (token, logout, validate) in tasks {
        logout.await.unwrap().unwrap();
        match validate.await.unwrap() {
            Ok(session) => assert_eq!(session.identity, "analyst1"),
            Err(AppError::SessionNotFound) => {}
            Err(e) => panic!("unexpected validation error: {}", e),
        }
        assert!(matches!(
            app.state.auth_service.authenticate(&token).await,
            Err(AppError::SessionNotFound)
        ));
    }

    assert_eq!(app.state.sessions.count_for("analyst1"), 0);
    assert_eq!(app.audit.count_kind(AuditEventKind::Logout).await, 40);
}
