//! 审计日志服务
//! 追加认证与授权事件；存储故障不会阻塞调用方

use std::sync::Arc;

use crate::{
    error::AppError,
    models::audit::*,
    repository::{AuditStore, StoreError},
};

/// 审计写入失败的运维告警通道
pub trait AlertSink: Send + Sync {
    fn audit_write_failed(&self, event: &AuditEvent, error: &StoreError);
}

/// 默认实现：输出 error 级别日志，由日志告警采集
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn audit_write_failed(&self, event: &AuditEvent, error: &StoreError) {
        tracing::error!(
            alert = "audit_write_failed",
            event_id = %event.id,
            kind = %event.kind,
            actor = %event.actor,
            target = ?event.target,
            error = %error,
            "Audit event could not be persisted"
        );
    }
}

pub struct AuditService {
    store: Arc<dyn AuditStore>,
    alerts: Arc<dyn AlertSink>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self::with_alerts(store, Arc::new(TracingAlertSink))
    }

    pub fn with_alerts(store: Arc<dyn AuditStore>, alerts: Arc<dyn AlertSink>) -> Self {
        Self { store, alerts }
    }

    /// 追加事件。不会失败：存储错误转交告警通道
    pub async fn record(&self, event: AuditEvent) {
        if event.kind.is_security_relevant() {
            tracing::warn!(
                kind = %event.kind,
                actor = %event.actor,
                target = ?event.target,
                detail = ?event.detail,
                "Security event"
            );
        } else {
            tracing::info!(
                kind = %event.kind,
                actor = %event.actor,
                target = ?event.target,
                "Audit event"
            );
        }

        if let Err(e) = self.store.append(&event).await {
            metrics::counter!("audit_write_failures_total").increment(1);
            self.alerts.audit_write_failed(&event, &e);
        }
    }

    /// 查询审计日志
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>, AppError> {
        Ok(self.store.query(filter).await?)
    }
}
