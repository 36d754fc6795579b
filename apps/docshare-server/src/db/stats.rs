//! Per-document access statistics and per-user usage summaries

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{now, Activity, ActivityRepository, BookmarkRepository, DocumentRepository, User};
use crate::error::Result;

/// Access event recorded against a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatEvent {
    View,
    Download,
    Share,
}

impl StatEvent {
    /// `(views, downloads, shares)` deltas for this event
    fn deltas(&self) -> (i64, i64, i64) {
        match self {
            StatEvent::View => (1, 0, 0),
            StatEvent::Download => (0, 1, 0),
            StatEvent::Share => (0, 0, 1),
        }
    }
}

/// Running totals for one document
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    pub document_id: String,
    pub views: i64,
    pub downloads: i64,
    pub shares: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Counts for one UTC day
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq, Eq)]
pub struct DailyStats {
    pub day: String,
    pub views: i64,
    pub downloads: i64,
    pub shares: i64,
}

/// Totals plus daily history, newest day first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatsReport {
    #[serde(flatten)]
    pub totals: DocumentStats,
    pub daily_stats: Vec<DailyStats>,
}

/// Document statistics repository
pub struct StatsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StatsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the empty totals row for a new document
    pub async fn init(&self, document_id: &str) -> Result<()> {
        let now = now();
        sqlx::query(
            r#"
            INSERT INTO document_stats (document_id, created_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(document_id) DO NOTHING
            "#,
        )
        .bind(document_id)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Upsert-and-increment the totals and today's bucket
    pub async fn record(&self, document_id: &str, event: StatEvent) -> Result<()> {
        let (views, downloads, shares) = event.deltas();
        let now = now();
        let today = Utc::now().date_naive().to_string();

        sqlx::query(
            r#"
            INSERT INTO document_stats (document_id, views, downloads, shares, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                views = views + excluded.views,
                downloads = downloads + excluded.downloads,
                shares = shares + excluded.shares,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_id)
        .bind(views)
        .bind(downloads)
        .bind(shares)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO document_daily_stats (document_id, day, views, downloads, shares)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id, day) DO UPDATE SET
                views = views + excluded.views,
                downloads = downloads + excluded.downloads,
                shares = shares + excluded.shares
            "#,
        )
        .bind(document_id)
        .bind(&today)
        .bind(views)
        .bind(downloads)
        .bind(shares)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Totals and daily history for a document
    pub async fn report(&self, document_id: &str) -> Result<Option<DocumentStatsReport>> {
        let totals = sqlx::query_as::<_, DocumentStats>(
            r#"
            SELECT document_id, views, downloads, shares, created_at, updated_at
            FROM document_stats
            WHERE document_id = ?
            "#,
        )
        .bind(document_id)
        .fetch_optional(self.pool)
        .await?;

        let Some(totals) = totals else {
            return Ok(None);
        };

        let daily_stats = sqlx::query_as::<_, DailyStats>(
            r#"
            SELECT day, views, downloads, shares
            FROM document_daily_stats
            WHERE document_id = ?
            ORDER BY day DESC
            "#,
        )
        .bind(document_id)
        .fetch_all(self.pool)
        .await?;

        Ok(Some(DocumentStatsReport { totals, daily_stats }))
    }
}

/// Number of activities shown on the dashboard summary
pub const RECENT_ACTIVITY_LIMIT: i64 = 10;

/// Dashboard summary for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_documents: i64,
    pub saved_documents: i64,
    pub uploaded_documents: i64,
    pub total_storage: i64,
    pub used_storage: i64,
    pub documents_by_type: BTreeMap<String, i64>,
    pub recent_activities: Vec<Activity>,
}

impl UserStats {
    /// Aggregate counts, storage and recent activity for `user`
    pub async fn collect(pool: &SqlitePool, user: &User) -> Result<Self> {
        let documents = DocumentRepository::new(pool);
        let total_documents = documents.count_for_owner(&user.id).await?;
        let documents_by_type = documents.count_by_type(&user.id).await?;
        let saved_documents = BookmarkRepository::new(pool).count_for_user(&user.id).await?;
        let recent_activities = ActivityRepository::new(pool)
            .recent(&user.id, RECENT_ACTIVITY_LIMIT)
            .await?;

        Ok(UserStats {
            total_documents,
            saved_documents,
            uploaded_documents: total_documents,
            total_storage: user.storage_limit,
            used_storage: user.storage_used,
            documents_by_type,
            recent_activities,
        })
    }
}
