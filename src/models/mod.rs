//! Domain models

pub mod access;
pub mod audit;
pub mod auth;
pub mod role;
pub mod session;
pub mod user;

pub use access::{Action, AdminOp, AdminTarget, Decision, DenyReason};
pub use audit::{AuditEvent, AuditEventKind, AuditFilter, UNKNOWN_ACTOR};
pub use role::Role;
pub use session::{IssuedSession, Session};
pub use user::{normalize_identity, same_country, AdminChange, User, UserChange};
