//! Bookmark database operations

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{now, Document, DocumentRepository};
use crate::error::{AppError, Result};

/// Bookmark record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    #[serde(rename = "userid")]
    pub user_id: String,
    #[serde(rename = "documentid")]
    pub document_id: String,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Bookmark joined with the document it points at
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkWithDocument {
    pub id: String,
    pub note: Option<String>,
    pub document: Document,
    pub created_at: String,
    pub updated_at: String,
}

/// Bookmark repository
pub struct BookmarkRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BookmarkRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find the caller's bookmark for a document
    pub async fn find(&self, user_id: &str, document_id: &str) -> Result<Option<Bookmark>> {
        let bookmark = sqlx::query_as::<_, Bookmark>(
            r#"
            SELECT id, user_id, document_id, note, created_at, updated_at
            FROM bookmarks
            WHERE user_id = ? AND document_id = ?
            "#,
        )
        .bind(user_id)
        .bind(document_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(bookmark)
    }

    /// Create a bookmark; fails with a unique violation if it already exists
    pub async fn create(&self, user_id: &str, document_id: &str, note: Option<&str>) -> Result<Bookmark> {
        let id = Uuid::new_v4().to_string();
        let now = now();

        sqlx::query(
            r#"
            INSERT INTO bookmarks (id, user_id, document_id, note, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(document_id)
        .bind(note)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.find(user_id, document_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created bookmark".to_string()))
    }

    /// Delete the caller's bookmark for a document
    pub async fn delete(&self, user_id: &str, document_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE user_id = ? AND document_id = ?")
            .bind(user_id)
            .bind(document_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all of the caller's bookmarks, orphaned ones included
    pub async fn count_for_user(&self, user_id: &str) -> Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookmarks WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;

        Ok(result.0)
    }

    /// A page of the caller's bookmarks, newest first, with their documents.
    ///
    /// Bookmarks whose document was soft-deleted, or made private by another
    /// owner, are dropped from the page but still counted in the returned total.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BookmarkWithDocument>, i64)> {
        let total = self.count_for_user(user_id).await?;

        let bookmarks = sqlx::query_as::<_, Bookmark>(
            r#"
            SELECT id, user_id, document_id, note, created_at, updated_at
            FROM bookmarks
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let documents = DocumentRepository::new(self.pool);
        let mut valid = Vec::with_capacity(bookmarks.len());
        for bookmark in bookmarks {
            let Some(document) = documents.get_active(&bookmark.document_id).await? else {
                continue;
            };
            if document.is_visible_to(Some(user_id)) {
                valid.push(BookmarkWithDocument {
                    id: bookmark.id,
                    note: bookmark.note,
                    document,
                    created_at: bookmark.created_at,
                    updated_at: bookmark.updated_at,
                });
            }
        }

        Ok((valid, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, DocumentChanges, NewDocument, NewUser, UserRepository};
    use crate::error::is_unique_violation;

    async fn setup(pool: &SqlitePool) -> (String, Document) {
        let user = UserRepository::new(pool)
            .create(&NewUser {
                name: "Reader",
                email: "r@x.com",
                password_hash: "hash",
                storage_limit: 1_000,
            })
            .await
            .unwrap();
        let doc = DocumentRepository::new(pool)
            .create(
                &user.id,
                &NewDocument {
                    title: "Shared Notes".to_string(),
                    description: None,
                    subject: None,
                    is_public: true,
                    keywords: vec![],
                    tags: vec![],
                    file_url: "/uploads/n.txt".to_string(),
                    original_file_name: "n.txt".to_string(),
                    file_type: "txt".to_string(),
                    file_size: 10,
                },
            )
            .await
            .unwrap();
        (user.id, doc)
    }

    #[tokio::test]
    async fn test_duplicate_bookmark_rejected() {
        let pool = test_pool().await;
        let (user_id, doc) = setup(&pool).await;
        let repo = BookmarkRepository::new(&pool);

        let bookmark = repo.create(&user_id, &doc.id, Some("read later")).await.unwrap();
        assert_eq!(bookmark.note.as_deref(), Some("read later"));

        match repo.create(&user_id, &doc.id, None).await.unwrap_err() {
            AppError::Database(e) => assert!(is_unique_violation(&e)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(repo.count_for_user(&user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_skips_deleted_documents() {
        let pool = test_pool().await;
        let (user_id, doc) = setup(&pool).await;
        let repo = BookmarkRepository::new(&pool);
        repo.create(&user_id, &doc.id, None).await.unwrap();

        let (items, total) = repo.list_for_user(&user_id, 10, 0).await.unwrap();
        assert_eq!((items.len(), total), (1, 1));
        assert_eq!(items[0].document.id, doc.id);

        DocumentRepository::new(&pool).soft_delete(&doc.id).await.unwrap();
        let (items, total) = repo.list_for_user(&user_id, 10, 0).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_list_hides_documents_made_private_by_owner() {
        let pool = test_pool().await;
        let (owner_id, doc) = setup(&pool).await;
        let reader = UserRepository::new(&pool)
            .create(&NewUser {
                name: "Other",
                email: "o@x.com",
                password_hash: "hash",
                storage_limit: 1_000,
            })
            .await
            .unwrap();
        let repo = BookmarkRepository::new(&pool);
        repo.create(&reader.id, &doc.id, None).await.unwrap();
        repo.create(&owner_id, &doc.id, None).await.unwrap();

        DocumentRepository::new(&pool)
            .update(
                &doc,
                &DocumentChanges {
                    is_public: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let (items, total) = repo.list_for_user(&reader.id, 10, 0).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 1);

        // The owner still sees their own private document
        let (items, _) = repo.list_for_user(&owner_id, 10, 0).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = test_pool().await;
        let (user_id, doc) = setup(&pool).await;
        let repo = BookmarkRepository::new(&pool);
        repo.create(&user_id, &doc.id, None).await.unwrap();

        assert!(repo.delete(&user_id, &doc.id).await.unwrap());
        assert!(!repo.delete(&user_id, &doc.id).await.unwrap());
    }
}
