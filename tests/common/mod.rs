//! 测试公共模块
//! In-memory application state on a manual clock, with a seeded user roster

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashboard_access::{
    auth::PasswordHasher,
    clock::{Clock, ManualClock},
    config::{
        AccessConfig, AppConfig, BootstrapConfig, LoggingConfig, SecurityConfig, ServerConfig,
    },
    middleware::AppState,
    models::{AuditEvent, AuditEventKind, AuditFilter, IssuedSession, Role, User, UserChange},
    repository::{AuditStore, InMemoryAuditStore, InMemoryUserStore, StoreError, UserStore},
    services::{AlertSink, AuditService},
};
use secrecy::Secret;
use std::sync::{Arc, Mutex};

/// Password shared by every seeded account
pub const PASSWORD: &str = "correct-horse";

pub const COUNTRIES: [&str; 4] = ["Uganda", "Kenya", "Cameroon", "Malawi"];

/// 创建测试配置
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            graceful_shutdown_timeout_secs: 5,
        },
        database: None,
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            session_timeout_minutes: 30,
            max_login_attempts: 5,
            lockout_duration_minutes: 15,
            attempt_window_minutes: 15,
            password_min_length: 6,
            argon2_memory_kib: 8,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            sweep_interval_secs: 0,
            trust_proxy: false,
        },
        access: AccessConfig {
            countries: COUNTRIES.iter().map(|c| c.to_string()).collect(),
        },
        bootstrap: BootstrapConfig::default(),
    }
}

/// Cheap Argon2 parameters; production defaults would make the suite crawl
pub fn test_hasher() -> PasswordHasher {
    PasswordHasher::with_params(8, 1, 1, 6).expect("test argon2 params are valid")
}

/// Audit store whose writes always fail
pub struct FailingAuditStore;

#[async_trait]
impl AuditStore for FailingAuditStore {
    async fn append(&self, _event: &AuditEvent) -> Result<(), StoreError> {
        Err(StoreError::Corrupt("audit volume unavailable".to_string()))
    }

    async fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditEvent>, StoreError> {
        Err(StoreError::Corrupt("audit volume unavailable".to_string()))
    }
}

/// Alert sink that remembers which events could not be written
#[derive(Default)]
pub struct RecordingAlertSink {
    pub failed: Mutex<Vec<AuditEventKind>>,
}

impl RecordingAlertSink {
    pub fn kinds(&self) -> Vec<AuditEventKind> {
        self.failed.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlertSink {
    fn audit_write_failed(&self, event: &AuditEvent, _error: &StoreError) {
        self.failed.lock().unwrap().push(event.kind);
    }
}

/// 在下一次查询某身份之后立即提交一项排队的修改，
/// 模拟管理员在登录校验密码期间提交变更
pub struct InterleavingUserStore {
    inner: Arc<InMemoryUserStore>,
    queued: Mutex<Option<(String, UserChange)>>,
}

impl InterleavingUserStore {
    pub fn new(inner: Arc<InMemoryUserStore>) -> Self {
        Self {
            inner,
            queued: Mutex::new(None),
        }
    }

    pub fn queue(&self, identity: &str, change: UserChange) {
        *self.queued.lock().unwrap() = Some((identity.to_string(), change));
    }

    pub fn is_drained(&self) -> bool {
        self.queued.lock().unwrap().is_none()
    }
}

#[async_trait]
impl UserStore for InterleavingUserStore {
    async fn lookup(&self, identity: &str) -> Result<User, StoreError> {
        let user = self.inner.lookup(identity).await;

        let due = {
            let mut queued = self.queued.lock().unwrap();
            match queued.as_ref() {
                Some((queued_identity, _)) if queued_identity == identity => queued.take(),
                _ => None,
            }
        };
        if let Some((identity, change)) = due {
            self.inner.update(&identity, change, Utc::now()).await?;
        }

        user
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        self.inner.insert(user).await
    }

    async fn update(
        &self,
        identity: &str,
        change: UserChange,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        self.inner.update(identity, change, now).await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        self.inner.list().await
    }
}

/// Application under test
pub struct TestApp {
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub users: Arc<InMemoryUserStore>,
    pub audit: Arc<InMemoryAuditStore>,
}

impl TestApp {
    pub async fn new() -> Self {
        let audit = Arc::new(InMemoryAuditStore::new());
        let audit_service = Arc::new(AuditService::new(audit.clone()));
        Self::build(audit, audit_service, |users| users as Arc<dyn UserStore>).await
    }

    /// Application whose credential store is an [`InterleavingUserStore`]
    pub async fn with_interleaving_store() -> (Self, Arc<InterleavingUserStore>) {
        let audit = Arc::new(InMemoryAuditStore::new());
        let audit_service = Arc::new(AuditService::new(audit.clone()));
        let mut wrapper = None;
        let app = Self::build(audit, audit_service, |users| {
            let store = Arc::new(InterleavingUserStore::new(users));
            wrapper = Some(store.clone());
            store as Arc<dyn UserStore>
        })
        .await;
        (app, wrapper.unwrap())
    }

    /// Application whose audit writes fail and land in `alerts`
    pub async fn with_failing_audit(alerts: Arc<RecordingAlertSink>) -> Self {
        let audit_service = Arc::new(AuditService::with_alerts(
            Arc::new(FailingAuditStore),
            alerts,
        ));
        Self::build(Arc::new(InMemoryAuditStore::new()), audit_service, |users| {
            users as Arc<dyn UserStore>
        })
        .await
    }

    async fn build(
        audit: Arc<InMemoryAuditStore>,
        audit_service: Arc<AuditService>,
        wrap: impl FnOnce(Arc<InMemoryUserStore>) -> Arc<dyn UserStore>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ));
        let users = Arc::new(InMemoryUserStore::new());

        seed_roster(users.as_ref(), clock.now()).await;

        let state = Arc::new(AppState::assemble(
            create_test_config(),
            wrap(users.clone()),
            audit_service,
            test_hasher(),
            None,
            clock.clone(),
        ));

        Self {
            state,
            clock,
            users,
            audit,
        }
    }

    pub fn router(&self) -> axum::Router {
        dashboard_access::routes::create_router(self.state.clone())
    }

    pub async fn login(&self, username: &str) -> IssuedSession {
        self.state
            .auth_service
            .login(username, &secret(PASSWORD))
            .await
            .unwrap_or_else(|e| panic!("login as {} failed: {}", username, e))
            .issued
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }

    pub async fn user(&self, identity: &str) -> User {
        self.users.lookup(identity).await.unwrap()
    }
}

pub fn secret(value: &str) -> Secret<String> {
    Secret::new(value.to_string())
}

/// 测试用的用户数据
pub const ROSTER: [(&str, Role, Option<&str>); 6] = [
    ("admin", Role::MasterUser, None),
    ("uganda_admin", Role::CountryAdmin, Some("Uganda")),
    ("cameroon_admin", Role::CountryAdmin, Some("Cameroon")),
    ("analyst1", Role::Analyst, Some("Uganda")),
    ("viewer1", Role::Viewer, Some("Uganda")),
    ("analyst2", Role::Analyst, Some("Cameroon")),
];

async fn seed_roster(store: &InMemoryUserStore, now: chrono::DateTime<Utc>) {
    let hash = test_hasher().hash(PASSWORD).unwrap();

    for (identity, role, country) in ROSTER {
        store
            .insert(User {
                identity: identity.to_string(),
                password_hash: hash.clone(),
                role,
                assigned_country: country.map(str::to_string),
                full_name: identity.to_string(),
                email: None,
                is_active: true,
                locked_until: None,
                last_login_at: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }
}
