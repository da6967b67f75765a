//! Audit repository (append-only event storage)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::StoreError;
use crate::models::{AuditEvent, AuditEventKind, AuditFilter};

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), StoreError>;

    /// Matching events, newest first
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>, StoreError>;
}

// ==================== In-memory ====================

#[derive(Default)]
pub struct InMemoryAuditStore {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event in append order
    pub async fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    pub async fn count_kind(&self, kind: AuditEventKind) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>, StoreError> {
        let limit = filter.effective_limit() as usize;
        let events = self.events.read().await;
        Ok(events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ==================== Postgres ====================

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    occurred_at: DateTime<Utc>,
    actor: String,
    kind: String,
    target: Option<String>,
    detail: Option<String>,
}

impl TryFrom<AuditRow> for AuditEvent {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditEvent {
            id: row.id,
            occurred_at: row.occurred_at,
            actor: row.actor,
            kind: row.kind.parse().map_err(StoreError::Corrupt)?,
            target: row.target,
            detail: row.detail,
        })
    }
}

pub struct PgAuditStore {
    db: PgPool,
}

impl PgAuditStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, event: &AuditEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (id, occurred_at, actor, kind, target, detail)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(event.occurred_at)
        .bind(&event.actor)
        .bind(event.kind.as_str())
        .bind(&event.target)
        .bind(&event.detail)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>, StoreError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, occurred_at, actor, kind, target, detail FROM audit_events WHERE 1=1",
        );

        if let Some(actor) = &filter.actor {
            query.push(" AND actor = ").push_bind(actor);
        }
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(target) = &filter.target {
            query.push(" AND target = ").push_bind(target);
        }
        if let Some(since) = filter.since {
            query.push(" AND occurred_at >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            query.push(" AND occurred_at <= ").push_bind(until);
        }

        query
            .push(" ORDER BY occurred_at DESC LIMIT ")
            .push_bind(filter.effective_limit());

        let rows: Vec<AuditRow> = query.build_query_as().fetch_all(&self.db).await?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNKNOWN_ACTOR;

    #[tokio::test]
    async fn test_in_memory_query_newest_first() {
        let store = InMemoryAuditStore::new();
        let start = Utc::now();

        for i in 0..3 {
            let event = AuditEvent::new(
                AuditEventKind::LoginFailure,
                UNKNOWN_ACTOR,
                start + chrono::Duration::seconds(i),
            )
            .with_target(format!("user{}", i));
            store.append(&event).await.unwrap();
        }

        let filter = AuditFilter {
            limit: Some(2),
            ..Default::default()
        };
        let events = store.query(&filter).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].target.as_deref(), Some("user2"));
        assert_eq!(events[1].target.as_deref(), Some("user1"));
        assert_eq!(store.count_kind(AuditEventKind::LoginFailure).await, 3);
    }
}
