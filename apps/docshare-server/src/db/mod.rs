//! Database module for SQLite persistence
//!
//! Handles users, documents, bookmarks, access statistics and the activity log.

mod activity;
mod bookmarks;
mod documents;
mod schema;
mod stats;
mod users;

pub use activity::*;
pub use bookmarks::*;
pub use documents::*;
pub use schema::*;
pub use stats::*;
pub use users::*;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::Result;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run migrations
    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Current time as a fixed-width RFC 3339 string, so text ordering matches time ordering
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Page/limit query parameters shared by every listing endpoint
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Largest page size a client may request
pub const MAX_PAGE_LIMIT: i64 = 100;

impl PageParams {
    /// Resolve to `(page, limit)` with 1-based page and a clamped limit
    pub fn resolve(&self, default_limit: i64) -> (i64, i64) {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let limit = self
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(default_limit)
            .min(MAX_PAGE_LIMIT);
        (page, limit)
    }
}

/// Pagination block returned alongside listings
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self { page, limit, total, pages }
    }

    /// Rows to skip; saturates instead of overflowing for huge page numbers
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).max(0).saturating_mul(self.limit)
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    // A single connection keeps every query on the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    initialize_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_defaults_and_clamping() {
        assert_eq!(PageParams::default().resolve(10), (1, 10));
        assert_eq!(PageParams { page: Some(0), limit: Some(-5) }.resolve(20), (1, 20));
        assert_eq!(PageParams { page: Some(3), limit: Some(500) }.resolve(10), (3, MAX_PAGE_LIMIT));
    }

    #[test]
    fn test_pagination_pages_and_offset() {
        let p = Pagination::new(2, 10, 25);
        assert_eq!(p.pages, 3);
        assert_eq!(p.offset(), 10);
        assert_eq!(Pagination::new(1, 10, 0).pages, 0);
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let (page, limit) = PageParams { page: Some(i64::MAX), limit: Some(MAX_PAGE_LIMIT) }.resolve(10);
        assert_eq!(page, i64::MAX);
        assert_eq!(Pagination::new(page, limit, 3).offset(), i64::MAX);
    }
}
