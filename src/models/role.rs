//! Role domain model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dashboard role. Closed set: adding a variant forces a decision in every policy match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// All countries, all actions
    MasterUser,
    /// Full access to the assigned country
    CountryAdmin,
    /// Read-only access to the assigned country
    Analyst,
    /// Limited read-only access to the assigned country
    Viewer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::MasterUser, Role::CountryAdmin, Role::Analyst, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::MasterUser => "master_user",
            Role::CountryAdmin => "country_admin",
            Role::Analyst => "analyst",
            Role::Viewer => "viewer",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::MasterUser => "Master User",
            Role::CountryAdmin => "Country Administrator",
            Role::Analyst => "Data Analyst",
            Role::Viewer => "Viewer",
        }
    }

    /// Numeric access level, higher means more access
    pub fn access_level(&self) -> u8 {
        match self {
            Role::MasterUser => 100,
            Role::CountryAdmin => 75,
            Role::Analyst => 50,
            Role::Viewer => 25,
        }
    }

    /// Only the master role may exist without an assigned country
    pub fn requires_country(&self) -> bool {
        !matches!(self, Role::MasterUser)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "master_user" => Ok(Role::MasterUser),
            "country_admin" => Ok(Role::CountryAdmin),
            "analyst" => Ok(Role::Analyst),
            "viewer" => Ok(Role::Viewer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}
