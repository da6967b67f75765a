//! Storage layer: credential store and audit log
//!
//! Both stores come in two flavours behind one trait: a volatile in-memory
//! implementation and a Postgres implementation for deployments that need
//! user records and audit history to survive restarts.

pub mod audit_repo;
pub mod user_repo;

pub use audit_repo::{AuditStore, InMemoryAuditStore, PgAuditStore};
pub use user_repo::{InMemoryUserStore, PgUserStore, UserStore};

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("User is inactive")]
    InactiveUser,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
