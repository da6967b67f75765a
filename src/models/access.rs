//! Authorization vocabulary: actions, decisions, denial reasons

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

/// Something a dashboard page asks to do with a country's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ViewDashboard,
    ViewAllZones,
    ExportData,
    GenerateReports,
    UseAssistant,
    ManageUsers,
    ReadAuditLog,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::ViewDashboard,
        Action::ViewAllZones,
        Action::ExportData,
        Action::GenerateReports,
        Action::UseAssistant,
        Action::ManageUsers,
        Action::ReadAuditLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewDashboard => "view_dashboard",
            Action::ViewAllZones => "view_all_zones",
            Action::ExportData => "export_data",
            Action::GenerateReports => "generate_reports",
            Action::UseAssistant => "use_assistant",
            Action::ManageUsers => "manage_users",
            Action::ReadAuditLog => "read_audit_log",
        }
    }

    /// Actions that only read data already shown on a page
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Action::ViewDashboard | Action::ViewAllZones | Action::ExportData | Action::UseAssistant
        )
    }

    /// Actions that take data out of the dashboard
    pub fn is_export(&self) -> bool {
        matches!(self, Action::ExportData)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    CountryScopeViolation,
    Forbidden,
    PolicyViolation(&'static str),
}

impl DenyReason {
    pub fn into_error(self) -> AppError {
        match self {
            DenyReason::CountryScopeViolation => AppError::CountryScopeViolation,
            DenyReason::Forbidden => AppError::Forbidden,
            DenyReason::PolicyViolation(why) => AppError::PolicyViolation(why.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason.into_error()),
        }
    }
}

/// What an administrator wants to do with another account
#[derive(Debug, Clone, Copy)]
pub enum AdminOp<'a> {
    Read,
    Create,
    Modify(&'a super::user::AdminChange),
}

impl AdminOp<'_> {
    pub fn is_read(&self) -> bool {
        matches!(self, AdminOp::Read)
    }
}

/// Role and country of the account an admin operation targets
#[derive(Debug, Clone, Copy)]
pub struct AdminTarget<'a> {
    pub identity: &'a str,
    pub role: super::role::Role,
    pub country: Option<&'a str>,
}

impl<'a> From<&'a super::user::User> for AdminTarget<'a> {
    fn from(user: &'a super::user::User) -> Self {
        Self {
            identity: &user.identity,
            role: user.role,
            country: user.assigned_country.as_deref(),
        }
    }
}
