//! 账户管理：创建、查询、修改、解锁

use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use validator::Validate;

use crate::{
    auth::password::PasswordHasher,
    clock::Clock,
    error::AppError,
    models::{
        normalize_identity, same_country, user::CreateUserRequest, AdminChange, AdminOp, AdminTarget,
        AuditEvent, AuditEventKind, Role, Session, User, UserChange,
    },
    repository::UserStore,
    services::{
        login_tracker::LoginAttemptTracker,
        permission_service::authorize_user_admin,
        session_service::SessionManager,
        AuditService, PermissionService,
    },
};

fn clean_country(country: Option<&str>) -> Option<String> {
    country
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

pub struct AdminService {
    users: Arc<dyn UserStore>,
    sessions: Arc<SessionManager>,
    tracker: Arc<LoginAttemptTracker>,
    hasher: PasswordHasher,
    audit: Arc<AuditService>,
    permissions: Arc<PermissionService>,
    clock: Arc<dyn Clock>,
}

impl AdminService {
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

    /// 返回目录中的规范国家名，未知国家报错
    fn catalogue_country(&self, country: Option<&str>) -> Result<Option<String>, AppError> {
        match clean_country(country) {
            None => Ok(None),
            Some(c) => self
                .permissions
                .countries()
                .iter()
                .find(|known| same_country(known, &c))
                .cloned()
                .map(Some)
                .ok_or_else(|| AppError::Validation(format!("Unknown country: {}", c))),
        }
    }

    async fn hash_password(&self, password: &Secret<String>) -> Result<String, AppError> {
        // 先校验密码策略再哈希
        self.hasher
            .validate_password_policy(password.expose_secret())?;

        let hasher = self.hasher.clone();
        let password = Secret::new(password.expose_secret().clone());
        tokio::task::spawn_blocking(move || hasher.hash(password.expose_secret()))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task failed: {}", e)))?
    }

    /// 创建用户
    pub async fn create_user(
        &self,
        actor: &Session,
        req: CreateUserRequest,
    ) -> Result<User, AppError> {
        req.validate()?;

        let identity = normalize_identity(&req.username);
        let country = if req.role.requires_country() {
            self.catalogue_country(req.assigned_country.as_deref())?
        } else {
            if clean_country(req.assigned_country.as_deref()).is_some() {
                return Err(AppError::PolicyViolation(
                    "master users cannot be pinned to a country".to_string(),
                ));
            }
            None
        };

        User::check_assignment(req.role, country.as_deref()).map_err(AppError::PolicyViolation)?;

        let target = AdminTarget {
            identity: &identity,
            role: req.role,
            country: country.as_deref(),
        };
        self.permissions
            .check_admin(actor, target, AdminOp::Create)
            .await
            .into_result()?;

        let password_hash = self.hash_password(&req.password).await?;
        let now = self.clock.now();

        let user = self
            .users
            .insert(User {
                identity: identity.clone(),
                password_hash,
                role: req.role,
                assigned_country: country,
                full_name: req.full_name.trim().to_string(),
                email: req.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
                is_active: true,
                locked_until: None,
                last_login_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditEventKind::UserCreated, &actor.identity, now)
                    .with_target(&identity)
                    .with_detail(format!(
                        "role={} country={}",
                        user.role,
                        user.assigned_country.as_deref().unwrap_or("-")
                    )),
            )
            .await;

        tracing::info!(
            actor = %actor.identity,
            identity = %identity,
            role = %user.role,
            "User created"
        );

        Ok(user)
    }

    /// 列出操作者可见的账户
    pub async fn manageable_users(&self, actor: &Session) -> Result<Vec<User>, AppError> {
        if !matches!(actor.role, Role::MasterUser | Role::CountryAdmin) {
            return Err(AppError::Forbidden);
        }

        let users = self.users.list().await?;
        Ok(users
            .into_iter()
            .filter(|u| authorize_user_admin(actor, AdminTarget::from(u), AdminOp::Read).is_allowed())
            .collect())
    }

    /// 查询单个账户，规则与列表相同
    pub async fn get_user(&self, actor: &Session, identity: &str) -> Result<User, AppError> {
        let user = self.users.lookup(&normalize_identity(identity)).await?;
        self.permissions
            .check_admin(actor, AdminTarget::from(&user), AdminOp::Read)
            .await
            .into_result()?;
        Ok(user)
    }

    /// 修改用户
    /// 修改密码、角色、国家或停用账户会结束目标用户的全部会话
    pub async fn modify_user(
        &self,
        actor: &Session,
        target_identity: &str,
        change: AdminChange,
    ) -> Result<User, AppError> {
        let identity = normalize_identity(target_identity);
        let user = self.users.lookup(&identity).await?;

        if identity == actor.identity
            && matches!(change, AdminChange::Role(_) | AdminChange::Active(false))
        {
            return Err(AppError::PolicyViolation(
                "administrators cannot change their own role or deactivate themselves".to_string(),
            ));
        }

        self.permissions
            .check_admin(actor, AdminTarget::from(&user), AdminOp::Modify(&change))
            .await
            .into_result()?;

        let field = change.field();
        let unlock = matches!(change, AdminChange::Unlock);
        let store_change = match change {
            AdminChange::Password(password) => {
                UserChange::PasswordHash(self.hash_password(&password).await?)
            }
            AdminChange::Role(role) => UserChange::Role(role),
            AdminChange::Country(country) => {
                UserChange::Country(self.catalogue_country(country.as_deref())?)
            }
            AdminChange::Active(active) => UserChange::Active(active),
            AdminChange::Unlock => UserChange::LockedUntil(None),
        };

        let invalidates = store_change.invalidates_sessions();
        let now = self.clock.now();

        // 与登录签发会话共用同一把身份锁：更新和吊销之间不会插入新会话
        let guard = self.sessions.lock_identity(&identity).await;
        let updated = self.users.update(&identity, store_change, now).await?;

        let ended = if invalidates {
            self.sessions.invalidate_all(&identity)
        } else {
            0
        };
        drop(guard);

        // 存储更新成功后才清除内存中的失败计数
        if unlock {
            self.tracker.reset(&identity);
        }

        let kind = if field == "password" {
            AuditEventKind::PasswordChanged
        } else {
            AuditEventKind::UserModified
        };
        self.audit
            .record(
                AuditEvent::new(kind, &actor.identity, now)
                    .with_target(&identity)
                    .with_detail(format!("field={} sessions_ended={}", field, ended)),
            )
            .await;

        tracing::info!(
            actor = %actor.identity,
            identity = %identity,
            field = %field,
            sessions_ended = ended,
            "User modified"
        );

        Ok(updated)
    }

    /// 解除锁定
    pub async fn unlock(&self, actor: &Session, target_identity: &str) -> Result<User, AppError> {
        self.modify_user(actor, target_identity, AdminChange::Unlock)
            .await
    }
}
