//! 认证服务：登录、登出、会话校验、修改密码

use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;

use crate::{
    auth::password::PasswordHasher,
    clock::Clock,
    error::AppError,
    models::{auth::MeResponse, *},
    repository::{StoreError, UserStore},
    services::{
        login_tracker::{FailureOutcome, LoginAttemptTracker},
        permission_service::{allowed_actions, allowed_countries, effective_country},
        session_service::{SessionError, SessionManager},
        AuditService, PermissionService,
    },
};

/// 登录成功的结果
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub issued: IssuedSession,
    pub user: User,
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<SessionManager>,
    tracker: Arc<LoginAttemptTracker>,
    hasher: PasswordHasher,
    audit: Arc<AuditService>,
    permissions: Arc<PermissionService>,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<SessionManager>,
        tracker: Arc<LoginAttemptTracker>,
        hasher: PasswordHasher,
        audit: Arc<AuditService>,
        permissions: Arc<PermissionService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            sessions,
            tracker,
            hasher,
            audit,
            permissions,
            clock,
        }
    }

    /// 用户登录
    pub async fn login(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<LoginSuccess, AppError> {
        let identity = normalize_identity(username);

        // 先查锁定：已锁定的身份不进入密码校验
        if let Err(until) = self.tracker.check(&identity, self.clock.now()) {
            self.record_failure_event(&identity, "account locked").await;
            metrics::counter!("auth_login_total", "outcome" => "locked").increment(1);
            return Err(AppError::AccountLocked { locked_until: until });
        }

        let user = match self.users.lookup(&identity).await {
            Ok(user) => Some(user),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        // 持久化的锁定在内存计数器重启后依然生效
        if let Some(until) = user
            .as_ref()
            .and_then(|u| u.locked_until)
            .filter(|until| self.clock.now() < *until)
        {
            self.record_failure_event(&identity, "account locked").await;
            metrics::counter!("auth_login_total", "outcome" => "locked").increment(1);
            return Err(AppError::AccountLocked { locked_until: until });
        }

        let verified = self
            .verify_password(password, user.as_ref().map(|u| u.password_hash.clone()))
            .await?;

        let now = self.clock.now();

        let user = match (verified, user) {
            (true, Some(user)) => user,
            (_, user) => return Err(self.handle_failure(&identity, user.as_ref()).await),
        };

        // 校验期间记录可能已被管理员修改：持锁重读，只接受与已校验哈希一致的记录
        let guard = self.sessions.lock_identity(&identity).await;
        let user = match self.users.lookup(&identity).await {
            Ok(fresh) if fresh.password_hash == user.password_hash => fresh,
            Ok(_) | Err(StoreError::NotFound) => {
                drop(guard);
                self.record_failure_event(&identity, "credentials changed during login")
                    .await;
                metrics::counter!("auth_login_total", "outcome" => "invalid_credentials")
                    .increment(1);
                return Err(AppError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        if !user.is_active {
            drop(guard);
            return Err(self.reject_inactive(&identity).await);
        }

        if let Err(until) = self.tracker.record_success(&identity, now) {
            drop(guard);
            // 校验期间并发失败已锁定账户
            self.record_failure_event(&identity, "account locked").await;
            metrics::counter!("auth_login_total", "outcome" => "locked").increment(1);
            return Err(AppError::AccountLocked { locked_until: until });
        }

        let user = match self.stamp_login(user, now).await {
            Ok(user) => user,
            Err(e) => {
                drop(guard);
                return Err(match e {
                    AppError::AccountInactive => self.reject_inactive(&identity).await,
                    other => other,
                });
            }
        };
        let issued = self.sessions.create(&user);
        drop(guard);

        self.audit
            .record(AuditEvent::new(AuditEventKind::LoginSuccess, &identity, now).with_target(&identity))
            .await;
        metrics::counter!("auth_login_total", "outcome" => "success").increment(1);

        tracing::info!(
            identity = %identity,
            role = %user.role,
            country = ?user.assigned_country,
            session = %issued.session.fingerprint(),
            "Login succeeded"
        );

        Ok(LoginSuccess { issued, user })
    }

    /// 在阻塞线程池中校验哈希；未知身份执行一次空校验
    async fn verify_password(
        &self,
        password: &Secret<String>,
        stored_hash: Option<String>,
    ) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let password = Secret::new(password.expose_secret().clone());

        tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => hasher.verify(password.expose_secret(), &hash),
            None => hasher.verify_dummy(password.expose_secret()),
        })
        .await
        .map_err(|e| AppError::Internal(format!("password verification task failed: {}", e)))
    }

    async fn hash_password(&self, password: &Secret<String>) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        let password = Secret::new(password.expose_secret().clone());

        tokio::task::spawn_blocking(move || hasher.hash(password.expose_secret()))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task failed: {}", e)))?
    }

    /// 记录一次失败并决定返回的错误
    async fn handle_failure(&self, identity: &str, user: Option<&User>) -> AppError {
        let now = self.clock.now();
        let outcome = self.tracker.record_failure(identity, now);

        self.record_failure_event(identity, "invalid credentials").await;

        match outcome {
            FailureOutcome::Accumulating { failures, remaining } => {
                tracing::info!(
                    identity = %identity,
                    failures = failures,
                    remaining = remaining,
                    "Login failed"
                );
                metrics::counter!("auth_login_total", "outcome" => "invalid_credentials")
                    .increment(1);
                AppError::InvalidCredentials
            }
            FailureOutcome::LockoutTriggered { until } => {
                metrics::counter!("auth_lockouts_total").increment(1);
                metrics::counter!("auth_login_total", "outcome" => "locked").increment(1);

                self.audit
                    .record(
                        AuditEvent::new(AuditEventKind::LockoutTriggered, UNKNOWN_ACTOR, now)
                            .with_target(identity)
                            .with_detail(format!("locked_until={}", until.to_rfc3339())),
                    )
                    .await;

                if user.is_some_and(|u| u.is_active) {
                    self.persist_lock(identity, Some(until)).await;
                }

                AppError::AccountLocked { locked_until: until }
            }
            FailureOutcome::AlreadyLocked { until } => {
                metrics::counter!("auth_login_total", "outcome" => "locked").increment(1);
                AppError::AccountLocked { locked_until: until }
            }
        }
    }

    /// 将锁定状态同步到凭据存储，失败只记日志
    async fn persist_lock(&self, identity: &str, until: Option<chrono::DateTime<chrono::Utc>>) {
        let change = UserChange::LockedUntil(until);
        if let Err(e) = self.users.update(identity, change, self.clock.now()).await {
            tracing::warn!(identity = %identity, error = %e, "Failed to persist lock state");
        }
    }

    /// 清除过期的持久化锁定并记录登录时间；账户已停用时返回 `AccountInactive`
    async fn stamp_login(
        &self,
        user: User,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<User, AppError> {
        let mut user = user;

        if user.locked_until.is_some() {
            match self
                .users
                .update(&user.identity, UserChange::LockedUntil(None), now)
                .await
            {
                Ok(updated) => user = updated,
                Err(StoreError::InactiveUser) => return Err(AppError::AccountInactive),
                Err(e) => {
                    tracing::warn!(identity = %user.identity, error = %e, "Failed to clear lock state")
                }
            }
        }

        match self
            .users
            .update(&user.identity, UserChange::LastLogin(now), now)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(StoreError::InactiveUser) => Err(AppError::AccountInactive),
            Err(e) => {
                tracing::warn!(identity = %user.identity, error = %e, "Failed to record last login");
                Ok(user)
            }
        }
    }

    async fn reject_inactive(&self, identity: &str) -> AppError {
        self.record_failure_event(identity, "account inactive").await;
        metrics::counter!("auth_login_total", "outcome" => "inactive").increment(1);
        AppError::AccountInactive
    }

    async fn record_failure_event(&self, identity: &str, detail: &str) {
        self.audit
            .record(
                AuditEvent::new(AuditEventKind::LoginFailure, UNKNOWN_ACTOR, self.clock.now())
                    .with_target(identity)
                    .with_detail(detail),
            )
            .await;
    }

    /// 登出
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        let session = self
            .sessions
            .invalidate(token)
            .ok_or(AppError::SessionNotFound)?;

        self.audit
            .record(
                AuditEvent::new(AuditEventKind::Logout, &session.identity, self.clock.now())
                    .with_target(&session.identity),
            )
            .await;

        tracing::info!(
            identity = %session.identity,
            session = %session.fingerprint(),
            "Logged out"
        );

        Ok(())
    }

    /// 校验令牌并顺延过期时间
    pub async fn authenticate(&self, token: &str) -> Result<Session, AppError> {
        match self.sessions.validate(token) {
            Ok(session) => Ok(session),
            Err(SessionError::Expired { identity }) => {
                self.audit
                    .record(
                        AuditEvent::new(AuditEventKind::SessionExpired, &identity, self.clock.now())
                            .with_target(&identity),
                    )
                    .await;
                Err(AppError::SessionExpired)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 数据请求：校验并刷新会话，再做授权
    pub async fn authorize_request(
        &self,
        token: &str,
        requested_country: Option<&str>,
        action: Action,
    ) -> Result<Session, AppError> {
        let session = self.authenticate(token).await?;
        self.permissions
            .check(&session, requested_country, action)
            .await
            .into_result()?;
        Ok(session)
    }

    /// 修改本人密码，并结束本人的其他会话
    pub async fn change_own_password(
        &self,
        session: &Session,
        old_password: &Secret<String>,
        new_password: &Secret<String>,
    ) -> Result<(), AppError> {
        // 先校验密码策略再哈希
        self.hasher
            .validate_password_policy(new_password.expose_secret())?;

        let user = self.users.lookup(&session.identity).await?;
        if !user.is_active {
            return Err(AppError::AccountInactive);
        }

        if !self
            .verify_password(old_password, Some(user.password_hash.clone()))
            .await?
        {
            tracing::info!(identity = %session.identity, "Password change rejected: wrong current password");
            return Err(AppError::InvalidCredentials);
        }

        let new_hash = self.hash_password(new_password).await?;

        let guard = self.sessions.lock_identity(&session.identity).await;
        let fresh = self.users.lookup(&session.identity).await?;
        if !fresh.is_active {
            return Err(AppError::AccountInactive);
        }
        if fresh.password_hash != user.password_hash {
            // 已被管理员重置
            return Err(AppError::InvalidCredentials);
        }

        self.users
            .update(
                &session.identity,
                UserChange::PasswordHash(new_hash),
                self.clock.now(),
            )
            .await?;

        let dropped = self
            .sessions
            .invalidate_all_except(&session.identity, &session.token_hash);
        drop(guard);

        self.audit
            .record(
                AuditEvent::new(AuditEventKind::PasswordChanged, &session.identity, self.clock.now())
                    .with_target(&session.identity)
                    .with_detail(format!("self-service; {} other session(s) ended", dropped)),
            )
            .await;

        Ok(())
    }

    /// 当前会话的身份、范围与权限
    pub fn me(&self, session: &Session) -> MeResponse {
        MeResponse {
            username: session.identity.clone(),
            role: session.role,
            role_name: session.role.display_name(),
            country: effective_country(session, None),
            allowed_countries: allowed_countries(session, self.permissions.countries()),
            allowed_actions: allowed_actions(session),
            session_expires_at: session.expires_at,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}
