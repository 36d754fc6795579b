//! User account database operations

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::now;
use crate::error::{AppError, Result};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Self {
        match value {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// User record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub image: Option<String>,
    pub storage_used: i64,
    pub storage_limit: i64,
    pub role: String,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Public view of a user; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub storage_used: i64,
    pub storage_limit: i64,
    pub storage_usage_percentage: i64,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            image: self.image.clone(),
            storage_used: self.storage_used,
            storage_limit: self.storage_limit,
            storage_usage_percentage: usage_percentage(self.storage_used, self.storage_limit),
            role: self.role(),
            is_active: self.is_active,
            last_login: self.last_login.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Rounded percentage of the quota in use
pub fn usage_percentage(used: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    ((used as f64 / limit as f64) * 100.0).round() as i64
}

/// Data required to create an account
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub storage_limit: i64,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, image, storage_used, storage_limit, \
                            role, is_active, last_login, created_at, updated_at";

/// User repository
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user by id
    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(user)
    }

    /// Get a user by (already normalized) email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(self.pool)
            .await?;

        Ok(user)
    }

    /// Create a new account
    pub async fn create(&self, data: &NewUser<'_>) -> Result<User> {
        let id = Uuid::new_v4().to_string();
        let now = now();

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, storage_limit, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(data.name)
        .bind(data.email)
        .bind(data.password_hash)
        .bind(data.storage_limit)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created user".to_string()))
    }

    /// Stamp the last successful login
    pub async fn touch_last_login(&self, id: &str) -> Result<Option<User>> {
        let now = now();
        sqlx::query("UPDATE users SET last_login = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(self.pool)
            .await?;

        self.get(id).await
    }

    /// Update name and/or email
    pub async fn update_details(
        &self,
        id: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>> {
        sqlx::query(
            r#"
            UPDATE users
            SET name = COALESCE(?, name),
                email = COALESCE(?, email),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(now())
        .bind(id)
        .execute(self.pool)
        .await?;

        self.get(id).await
    }

    /// Replace the stored password hash
    pub async fn update_password(&self, id: &str, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(now())
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Enable or disable an account
    pub async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now())
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically add `bytes` to the user's usage if it stays within quota.
    ///
    /// Returns `false` (and changes nothing) when the quota would be exceeded.
    pub async fn reserve_storage(&self, id: &str, bytes: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET storage_used = storage_used + ?, updated_at = ?
            WHERE id = ? AND storage_used + ? <= storage_limit
            "#,
        )
        .bind(bytes)
        .bind(now())
        .bind(id)
        .bind(bytes)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically subtract `bytes` from the user's usage, never going below zero
    pub async fn release_storage(&self, id: &str, bytes: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET storage_used = MAX(0, storage_used - ?), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(bytes)
        .bind(now())
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Total number of accounts
    pub async fn count(&self) -> Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;

        Ok(result.0)
    }
}
