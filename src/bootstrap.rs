//! Seed accounts from a TOML users file
//!
//! ```toml
//! [users.admin]
//! password_hash = "$argon2id$v=19$..."
//! role = "master_user"
//! full_name = "Dashboard Administrator"
//!
//! [users.uganda_admin]
//! password_hash = "$argon2id$v=19$..."
//! role = "country_admin"
//! assigned_country = "Uganda"
//! ```
//!
//! Hashes come from `dashboard-access --hash-password`. Existing accounts are
//! left untouched, so the file only ever creates.

use argon2::password_hash::PasswordHash;
use chrono::{DateTime, Utc};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::{
    error::AppError,
    models::{normalize_identity, Role, User},
    repository::{StoreError, UserStore},
};

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: BTreeMap<String, SeedUser>,
}

#[derive(Debug, Deserialize)]
struct SeedUser {
    password_hash: String,
    role: String,
    assigned_country: Option<String>,
    #[serde(default)]
    full_name: String,
    email: Option<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

impl SeedUser {
    fn into_user(self, identity: &str, now: DateTime<Utc>) -> Result<User, AppError> {
        let identity = normalize_identity(identity);
        let invalid = |why: String| AppError::Config(format!("users file, {}: {}", identity, why));

        let role: Role = self.role.parse().map_err(|e| invalid(format!("{}", e)))?;

        PasswordHash::new(&self.password_hash)
            .map_err(|e| invalid(format!("password_hash is not a PHC string ({})", e)))?;

        let country = self
            .assigned_country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        User::check_assignment(role, country.as_deref()).map_err(invalid)?;

        Ok(User {
            identity,
            password_hash: self.password_hash,
            role,
            assigned_country: country,
            full_name: self.full_name,
            email: self.email,
            is_active: self.is_active,
            locked_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Parse users from TOML text
pub fn parse_users(toml: &str, now: DateTime<Utc>) -> Result<Vec<User>, AppError> {
    let file: UsersFile = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?
        .try_deserialize()?;

    file.users
        .into_iter()
        .map(|(identity, seed)| seed.into_user(&identity, now))
        .collect()
}

/// Parse users from a TOML file on disk
pub fn load_users_file(path: &str, now: DateTime<Utc>) -> Result<Vec<User>, AppError> {
    let file: UsersFile = Config::builder()
        .add_source(File::new(path, FileFormat::Toml))
        .build()?
        .try_deserialize()?;

    file.users
        .into_iter()
        .map(|(identity, seed)| seed.into_user(&identity, now))
        .collect()
}

/// Insert accounts that do not exist yet; returns how many were created
pub async fn seed_users(store: &dyn UserStore, users: Vec<User>) -> Result<usize, AppError> {
    let mut created = 0;

    for user in users {
        let identity = user.identity.clone();
        match store.insert(user).await {
            Ok(_) => {
                created += 1;
                tracing::info!(identity = %identity, "Seeded user");
            }
            Err(StoreError::Conflict(_)) => {
                tracing::debug!(identity = %identity, "Seed user already exists, skipped");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryUserStore;

    const HASH: &str = "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$Yt3dvgAtIHnM0x4yLuhYDQ";

    fn sample() -> String {
        format!(
            r#"
[users.Admin]
password_hash = "{hash}"
role = "master_user"
full_name = "Administrator"

[users.uganda_admin]
password_hash = "{hash}"
role = "country_admin"
assigned_country = "Uganda"
"#,
            hash = HASH
        )
    }

    #[test]
    fn test_parse_users() {
        let users = parse_users(&sample(), Utc::now()).unwrap();
        assert_eq!(users.len(), 2);

        let admin = users.iter().find(|u| u.identity == "admin").unwrap();
        assert_eq!(admin.role, Role::MasterUser);
        assert!(admin.assigned_country.is_none());

        let uganda = users.iter().find(|u| u.identity == "uganda_admin").unwrap();
        assert_eq!(uganda.assigned_country.as_deref(), Some("Uganda"));
        assert!(uganda.is_active);
    }

    #[test]
    fn test_rejects_country_admin_without_country() {
        let toml = format!(
            "[users.x]\npassword_hash = \"{}\"\nrole = \"country_admin\"\n",
            HASH
        );
        assert!(matches!(
            parse_users(&toml, Utc::now()),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_plaintext_password() {
        let toml = "[users.x]\npassword_hash = \"hunter2\"\nrole = \"viewer\"\nassigned_country = \"Malawi\"\n";
        assert!(parse_users(toml, Utc::now()).is_err());
    }

    #[tokio::test]
    async fn test_seed_skips_existing() {
        let store = InMemoryUserStore::new();
        let users = parse_users(&sample(), Utc::now()).unwrap();
        assert_eq!(seed_users(&store, users).await.unwrap(), 2);

        let users = parse_users(&sample(), Utc::now()).unwrap();
        assert_eq!(seed_users(&store, users).await.unwrap(), 0);
    }
}
