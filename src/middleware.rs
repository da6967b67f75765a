//! HTTP 中间件
//! Application state wiring and request tracking

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    auth::password::PasswordHasher,
    clock::Clock,
    config::AppConfig,
    error::AppError,
    repository::{AuditStore, UserStore},
    services::{
        AdminService, AuditService, AuthService, LockoutPolicy, LoginAttemptTracker,
        PermissionService, SessionManager,
    },
};

/// Storage backends the services run on
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub audit: Arc<dyn AuditStore>,
}

/// 应用状态
/// Every service is shared behind an Arc; the session table and the
/// attempt tracker are owned here and handed to the services by handle.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Option<sqlx::PgPool>,
    pub users: Arc<dyn UserStore>,
    pub auth_service: Arc<AuthService>,
    pub admin_service: Arc<AdminService>,
    pub permission_service: Arc<PermissionService>,
    pub audit_service: Arc<AuditService>,
    pub sessions: Arc<SessionManager>,
    pub tracker: Arc<LoginAttemptTracker>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        stores: Stores,
        db: Option<sqlx::PgPool>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let hasher = PasswordHasher::from_config(&config.security)?;
        let audit_service = Arc::new(AuditService::new(stores.audit));
        Ok(Self::assemble(config, stores.users, audit_service, hasher, db, clock))
    }

    /// Wire the services over explicit parts; tests swap in cheap hashers and failing sinks
    pub fn assemble(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        audit_service: Arc<AuditService>,
        hasher: PasswordHasher,
        db: Option<sqlx::PgPool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            config.session_timeout(),
            clock.clone(),
        ));
        let tracker = Arc::new(LoginAttemptTracker::new(LockoutPolicy::from_config(
            &config.security,
        )));
        let permission_service = Arc::new(PermissionService::new(
            audit_service.clone(),
            clock.clone(),
            config.access.countries.clone(),
        ));

        let auth_service = Arc::new(AuthService::new(
            users.clone(),
            sessions.clone(),
            tracker.clone(),
            hasher.clone(),
            audit_service.clone(),
            permission_service.clone(),
            clock.clone(),
        ));
        let admin_service = Arc::new(AdminService::new(
            users.clone(),
            sessions.clone(),
            tracker.clone(),
            hasher,
            audit_service.clone(),
            permission_service.clone(),
            clock.clone(),
        ));

        Self {
            config,
            db,
            users,
            auth_service,
            admin_service,
            permission_service,
            audit_service,
            sessions,
            tracker,
            clock,
        }
    }
}

/// 请求追踪中间件
/// Tags every request with trace/request ids and records metrics
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    async move {
        let start = Instant::now();

        let mut response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            "PATCH" => "PATCH",
            _ => "OTHER",
        };
        let status_class = match status {
            200..=299 => "2xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "other",
        };

        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_class)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// 获取客户端 IP 地址, for log fields only
pub fn client_ip(headers: &HeaderMap, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(ip) = forwarded {
            return ip;
        }

        if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            return ip.to_string();
        }
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_or_generate_trace_id() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "test-trace-123".parse().unwrap());

        let trace_id = extract_or_generate_trace_id(&headers);
        assert_eq!(trace_id, "test-trace-123");

        let headers = HeaderMap::new();
        let trace_id = extract_or_generate_trace_id(&headers);
        assert!(!trace_id.is_empty());
        assert_ne!(trace_id, "test-trace-123");
    }

    #[test]
    fn test_client_ip_respects_trust_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.7, 172.16.0.1".parse().unwrap());

        assert_eq!(client_ip(&headers, true), "10.0.0.7");
        assert_eq!(client_ip(&headers, false), "unknown");
    }
}
