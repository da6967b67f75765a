//! Business logic services layer

pub mod admin_service;
pub mod audit_service;
pub mod auth_service;
pub mod login_tracker;
pub mod permission_service;
pub mod session_service;
pub mod sweeper;

pub use admin_service::AdminService;
pub use audit_service::{AlertSink, AuditService, TracingAlertSink};
pub use auth_service::{AuthService, LoginSuccess};
pub use login_tracker::{AttemptState, FailureOutcome, LockoutPolicy, LoginAttemptTracker};
pub use permission_service::{authorize, authorize_user_admin, filter_by_scope, PermissionService};
pub use session_service::{SessionError, SessionManager};
