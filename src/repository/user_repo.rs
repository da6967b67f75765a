//! User repository (credential store)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use sqlx::PgPool;

use super::StoreError;
use crate::models::{Role, User, UserChange};

/// Credential store contract. Updates to one identity are serialized by the implementation.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up by normalized identity
    async fn lookup(&self, identity: &str) -> Result<User, StoreError>;

    /// Insert a new account; an existing identity is a conflict
    async fn insert(&self, user: User) -> Result<User, StoreError>;

    /// Apply one atomic field change and return the updated record
    async fn update(
        &self,
        identity: &str,
        change: UserChange,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    /// All accounts, ordered by identity
    async fn list(&self) -> Result<Vec<User>, StoreError>;
}

/// Shared update rule: inactive accounts only accept reactivation
fn apply_change(user: &mut User, change: &UserChange, now: DateTime<Utc>) -> Result<(), StoreError> {
    if !user.is_active && !change.is_reactivation() {
        return Err(StoreError::InactiveUser);
    }

    let mut updated = user.clone();
    change
        .apply(&mut updated, now)
        .map_err(StoreError::InvalidAssignment)?;
    *user = updated;
    Ok(())
}

// ==================== In-memory ====================

/// Volatile store; the map shard lock serializes updates per identity
#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn lookup(&self, identity: &str) -> Result<User, StoreError> {
        self.users
            .get(identity)
            .map(|u| u.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        User::check_assignment(user.role, user.assigned_country.as_deref())
            .map_err(StoreError::InvalidAssignment)?;

        match self.users.entry(user.identity.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "user {} already exists",
                user.identity
            ))),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn update(
        &self,
        identity: &str,
        change: UserChange,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut entry = self.users.get_mut(identity).ok_or(StoreError::NotFound)?;
        apply_change(entry.value_mut(), &change, now)?;
        Ok(entry.value().clone())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(users)
    }
}

// ==================== Postgres ====================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    identity: String,
    password_hash: String,
    role: String,
    assigned_country: Option<String>,
    full_name: String,
    email: Option<String>,
    is_active: bool,
    locked_until: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("user {}: {}", row.identity, e)))?;

        Ok(User {
            identity: row.identity,
            password_hash: row.password_hash,
            role,
            assigned_country: row.assigned_country,
            full_name: row.full_name,
            email: row.email,
            is_active: row.is_active,
            locked_until: row.locked_until,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "identity, password_hash, role, assigned_country, full_name, email, \
     is_active, locked_until, last_login_at, created_at, updated_at";

/// Durable store; `SELECT ... FOR UPDATE` serializes updates per identity
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn lookup(&self, identity: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE identity = $1",
            USER_COLUMNS
        ))
        .bind(identity)
        .fetch_optional(&self.db)
        .await?;

        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        User::check_assignment(user.role, user.assigned_country.as_deref())
            .map_err(StoreError::InvalidAssignment)?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (
                identity, password_hash, role, assigned_country, full_name, email,
                is_active, locked_until, last_login_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (identity) DO NOTHING
            "#,
        )
        .bind(&user.identity)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.assigned_country)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.is_active)
        .bind(user.locked_until)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "user {} already exists",
                user.identity
            )));
        }

        Ok(user)
    }

    async fn update(
        &self,
        identity: &str,
        change: UserChange,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE identity = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(identity)
        .fetch_optional(&mut *tx)
        .await?;

        let mut user: User = row.ok_or(StoreError::NotFound)?.try_into()?;
        apply_change(&mut user, &change, now)?;

        sqlx::query(
            r#"
            UPDATE users
            SET
                password_hash = $2,
                role = $3,
                assigned_country = $4,
                is_active = $5,
                locked_until = $6,
                last_login_at = $7,
                updated_at = $8
            WHERE identity = $1
            "#,
        )
        .bind(&user.identity)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.assigned_country)
        .bind(user.is_active)
        .bind(user.locked_until)
        .bind(user.last_login_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY identity",
            USER_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer(identity: &str) -> User {
        let now = Utc::now();
        User {
            identity: identity.to_string(),
            password_hash: "hash".to_string(),
            role: Role::Viewer,
            assigned_country: Some("Lesotho".to_string()),
            full_name: String::new(),
            email: None,
            is_active: true,
            locked_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_lookup_missing_is_not_found() {
        let store = InMemoryUserStore::new();
        assert!(matches!(
            store.lookup("nobody").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_insert_duplicate_conflicts() {
        let store = InMemoryUserStore::new();
        store.insert(viewer("viewer1")).await.unwrap();
        assert!(matches!(
            store.insert(viewer("viewer1")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_update_inactive_requires_reactivation() {
        let store = InMemoryUserStore::new();
        store.insert(viewer("viewer1")).await.unwrap();
        let now = Utc::now();

        store.update("viewer1", UserChange::Active(false), now).await.unwrap();

        let err = store
            .update("viewer1", UserChange::PasswordHash("new".into()), now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InactiveUser));

        let user = store.update("viewer1", UserChange::Active(true), now).await.unwrap();
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn test_invalid_assignment_leaves_record_untouched() {
        let store = InMemoryUserStore::new();
        store.insert(viewer("viewer1")).await.unwrap();

        let err = store
            .update("viewer1", UserChange::Country(None), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidAssignment(_)));

        let user = store.lookup("viewer1").await.unwrap();
        assert_eq!(user.assigned_country.as_deref(), Some("Lesotho"));
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let store = InMemoryUserStore::new();
        store.insert(viewer("zeta")).await.unwrap();
        store.insert(viewer("alpha")).await.unwrap();
        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.identity)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
