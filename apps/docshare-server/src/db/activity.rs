//! Append-only user activity log

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::now;
use crate::error::Result;

/// Kind of action recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Upload,
    Download,
    View,
    Share,
    Save,
    Delete,
    Login,
    Register,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Upload => "upload",
            ActivityType::Download => "download",
            ActivityType::View => "view",
            ActivityType::Share => "share",
            ActivityType::Save => "save",
            ActivityType::Delete => "delete",
            ActivityType::Login => "login",
            ActivityType::Register => "register",
        }
    }
}

/// Request metadata captured with each entry
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Entry to append
#[derive(Debug, Clone)]
pub struct NewActivity<'a> {
    pub user_id: &'a str,
    pub activity_type: ActivityType,
    pub document_id: Option<&'a str>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub client: &'a ClientInfo,
}

impl<'a> NewActivity<'a> {
    pub fn new(user_id: &'a str, activity_type: ActivityType, description: String, client: &'a ClientInfo) -> Self {
        Self {
            user_id,
            activity_type,
            document_id: None,
            description,
            metadata: serde_json::json!({}),
            client,
        }
    }

    pub fn document(mut self, document_id: &'a str) -> Self {
        self.document_id = Some(document_id);
        self
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ActivityRow {
    id: String,
    user_id: String,
    activity_type: String,
    document_id: Option<String>,
    document_title: Option<String>,
    description: String,
    metadata: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: String,
}

/// Document reference shown with an activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityDocument {
    pub id: String,
    pub title: Option<String>,
}

/// Activity log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    #[serde(rename = "userid")]
    pub user_id: String,
    pub activity_type: String,
    #[serde(rename = "documentid")]
    pub document: Option<ActivityDocument>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

impl From<ActivityRow> for Activity {
    fn from(row: ActivityRow) -> Self {
        Activity {
            id: row.id,
            user_id: row.user_id,
            activity_type: row.activity_type,
            document: row.document_id.map(|id| ActivityDocument {
                id,
                title: row.document_title,
            }),
            description: row.description,
            metadata: serde_json::from_str(&row.metadata).unwrap_or_else(|_| serde_json::json!({})),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

const ACTIVITY_SELECT: &str = r#"
    SELECT a.id, a.user_id, a.activity_type, a.document_id, d.title AS document_title,
           a.description, a.metadata, a.ip_address, a.user_agent, a.created_at
    FROM user_activities a
    LEFT JOIN documents d ON d.id = a.document_id
"#;

/// Activity repository
pub struct ActivityRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ActivityRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an entry
    pub async fn log(&self, entry: &NewActivity<'_>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_activities (id, user_id, activity_type, document_id, description,
                                         metadata, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entry.user_id)
        .bind(entry.activity_type.as_str())
        .bind(entry.document_id)
        .bind(&entry.description)
        .bind(entry.metadata.to_string())
        .bind(&entry.client.ip_address)
        .bind(&entry.client.user_agent)
        .bind(now())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// A page of the user's activities, newest first
    pub async fn list(&self, user_id: &str, limit: i64, offset: i64) -> Result<(Vec<Activity>, i64)> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_activities WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;

        let rows = sqlx::query_as::<_, ActivityRow>(&format!(
            "{} WHERE a.user_id = ? ORDER BY a.created_at DESC, a.rowid DESC LIMIT ? OFFSET ?",
            ACTIVITY_SELECT
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok((rows.into_iter().map(Activity::from).collect(), total.0))
    }

    /// The `limit` most recent activities for a user
    pub async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<Activity>> {
        Ok(self.list(user_id, limit, 0).await?.0)
    }
}
