//! Document metadata database operations

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::now;
use crate::error::{AppError, Result};

/// Raw document row joined with its owner
#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    description: Option<String>,
    file_url: String,
    original_file_name: String,
    file_type: String,
    file_size: i64,
    subject: Option<String>,
    keywords: String,
    tags: String,
    is_public: bool,
    user_id: String,
    view_count: i64,
    download_count: i64,
    share_count: i64,
    is_deleted: bool,
    deleted_at: Option<String>,
    created_at: String,
    updated_at: String,
    owner_name: Option<String>,
    owner_email: Option<String>,
}

/// Owner summary embedded in document responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "fileurl")]
    pub file_url: String,
    pub original_file_name: String,
    #[serde(rename = "filetype")]
    pub file_type: String,
    #[serde(rename = "filesize")]
    pub file_size: i64,
    pub filesize_formatted: String,
    pub subject: Option<String>,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    #[serde(rename = "ispublic")]
    pub is_public: bool,
    #[serde(rename = "userid")]
    pub owner: Owner,
    pub view_count: i64,
    pub download_count: i64,
    pub share_count: i64,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner.id == user_id
    }

    /// Whether `viewer` may read this document
    pub fn is_visible_to(&self, viewer: Option<&str>) -> bool {
        self.is_public || viewer.is_some_and(|id| self.is_owned_by(id))
    }

    /// Stored file name (last path segment of the public URL)
    pub fn stored_file_name(&self) -> &str {
        self.file_url.rsplit('/').next().unwrap_or(&self.file_url)
    }
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            filesize_formatted: format_file_size(row.file_size),
            keywords: decode_list(&row.keywords),
            tags: decode_list(&row.tags),
            owner: Owner {
                id: row.user_id,
                name: row.owner_name,
                email: row.owner_email,
            },
            id: row.id,
            title: row.title,
            description: row.description,
            file_url: row.file_url,
            original_file_name: row.original_file_name,
            file_type: row.file_type,
            file_size: row.file_size,
            subject: row.subject,
            is_public: row.is_public,
            view_count: row.view_count,
            download_count: row.download_count,
            share_count: row.share_count,
            is_deleted: row.is_deleted,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Metadata for a freshly uploaded document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub is_public: bool,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub file_url: String,
    pub original_file_name: String,
    pub file_type: String,
    pub file_size: i64,
}

/// Partial update of editable metadata
#[derive(Debug, Clone, Default)]
pub struct DocumentChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub is_public: Option<bool>,
    pub keywords: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

/// Filters for the public listing
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub search: Option<String>,
    pub file_type: Option<String>,
    pub subject: Option<String>,
}

/// Which counter an access event bumps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    View,
    Download,
    Share,
}

impl Counter {
    fn column(&self) -> &'static str {
        match self {
            Counter::View => "view_count",
            Counter::Download => "download_count",
            Counter::Share => "share_count",
        }
    }
}

const DOCUMENT_SELECT: &str = r#"
    SELECT d.id, d.title, d.description, d.file_url, d.original_file_name, d.file_type,
           d.file_size, d.subject, d.keywords, d.tags, d.is_public, d.user_id,
           d.view_count, d.download_count, d.share_count, d.is_deleted, d.deleted_at,
           d.created_at, d.updated_at,
           u.name AS owner_name, u.email AS owner_email
    FROM documents d
    LEFT JOIN users u ON u.id = d.user_id
"#;

/// Document repository
pub struct DocumentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DocumentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a document by id, including soft-deleted ones
    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!("{} WHERE d.id = ?", DOCUMENT_SELECT))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Document::from))
    }

    /// Get a document that has not been soft-deleted
    pub async fn get_active(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.get(id).await?.filter(|d| !d.is_deleted))
    }

    /// Insert a new document owned by `user_id`
    pub async fn create(&self, user_id: &str, data: &NewDocument) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let now = now();
        let keywords = merge_keywords(
            &data.keywords,
            &data.title,
            data.description.as_deref().unwrap_or(""),
        );

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, description, file_url, original_file_name, file_type,
                                   file_size, subject, keywords, tags, is_public, user_id,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(&data.file_url)
        .bind(&data.original_file_name)
        .bind(&data.file_type)
        .bind(data.file_size)
        .bind(&data.subject)
        .bind(encode_list(&keywords)?)
        .bind(encode_list(&normalize_terms(&data.tags))?)
        .bind(data.is_public)
        .bind(user_id)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created document".to_string()))
    }

    /// Apply metadata changes to an existing document
    pub async fn update(&self, current: &Document, changes: &DocumentChanges) -> Result<Option<Document>> {
        let title = changes.title.clone().unwrap_or_else(|| current.title.clone());
        let description = changes.description.clone().or_else(|| current.description.clone());

        let mut keywords = changes
            .keywords
            .as_ref()
            .map(|k| normalize_terms(k))
            .unwrap_or_else(|| current.keywords.clone());
        if changes.title.is_some() || changes.description.is_some() {
            keywords = merge_keywords(&keywords, &title, description.as_deref().unwrap_or(""));
        }
        let tags = changes
            .tags
            .as_ref()
            .map(|t| normalize_terms(t))
            .unwrap_or_else(|| current.tags.clone());

        sqlx::query(
            r#"
            UPDATE documents
            SET title = ?, description = ?, subject = COALESCE(?, subject),
                is_public = COALESCE(?, is_public), keywords = ?, tags = ?, updated_at = ?
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(&title)
        .bind(&description)
        .bind(&changes.subject)
        .bind(changes.is_public)
        .bind(encode_list(&keywords)?)
        .bind(encode_list(&tags)?)
        .bind(now())
        .bind(&current.id)
        .execute(self.pool)
        .await?;

        self.get_active(&current.id).await
    }

    /// Mark a document deleted. Returns `false` if it was already deleted.
    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let now = now();
        let result = sqlx::query(
            "UPDATE documents SET is_deleted = 1, deleted_at = ?, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically bump one of the access counters
    pub async fn increment(&self, id: &str, counter: Counter) -> Result<()> {
        let column = counter.column();
        sqlx::query(&format!("UPDATE documents SET {column} = {column} + 1 WHERE id = ?"))
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// List public, non-deleted documents matching `filter`, newest first
    pub async fn list_public(
        &self,
        filter: &DocumentFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Document>, i64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM documents d");
        push_public_filter(&mut count, filter);
        let total: (i64,) = count.build_query_as().fetch_one(self.pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new(DOCUMENT_SELECT);
        push_public_filter(&mut query, filter);
        query
            .push(" ORDER BY d.created_at DESC, d.rowid DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query.build_query_as::<DocumentRow>().fetch_all(self.pool).await?;
        Ok((rows.into_iter().map(Document::from).collect(), total.0))
    }

    /// List the caller's own non-deleted documents, newest first
    pub async fn list_for_owner(&self, user_id: &str, limit: i64, offset: i64) -> Result<(Vec<Document>, i64)> {
        let total = self.count_for_owner(user_id).await?;

        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "{} WHERE d.user_id = ? AND d.is_deleted = 0 ORDER BY d.created_at DESC, d.rowid DESC LIMIT ? OFFSET ?",
            DOCUMENT_SELECT
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok((rows.into_iter().map(Document::from).collect(), total))
    }

    /// Count the caller's non-deleted documents
    pub async fn count_for_owner(&self, user_id: &str) -> Result<i64> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM documents WHERE user_id = ? AND is_deleted = 0")
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;

        Ok(result.0)
    }

    /// Count the caller's non-deleted documents grouped by file type
    pub async fn count_by_type(&self, user_id: &str) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT file_type, COUNT(*)
            FROM documents
            WHERE user_id = ? AND is_deleted = 0
            GROUP BY file_type
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

fn push_public_filter<'q>(builder: &mut QueryBuilder<'q, Sqlite>, filter: &'q DocumentFilter) {
    builder.push(" WHERE d.is_public = 1 AND d.is_deleted = 0");

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        builder.push(" AND (d.title LIKE ");
        builder.push_bind(pattern.clone()).push(" ESCAPE '\\'");
        builder.push(" OR d.description LIKE ");
        builder.push_bind(pattern.clone()).push(" ESCAPE '\\'");
        builder.push(" OR d.subject LIKE ");
        builder.push_bind(pattern.clone()).push(" ESCAPE '\\'");
        // Match keyword values, not the JSON text they are stored as
        builder.push(" OR EXISTS (SELECT 1 FROM json_each(d.keywords) k WHERE k.value LIKE ");
        builder.push_bind(pattern).push(" ESCAPE '\\'))");
    }

    if let Some(file_type) = filter.file_type.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" AND d.file_type = ").push_bind(file_type.to_lowercase());
    }

    if let Some(subject) = filter.subject.as_deref().filter(|s| !s.is_empty()) {
        builder
            .push(" AND d.subject LIKE ")
            .push_bind(like_pattern(subject))
            .push(" ESCAPE '\\'");
    }
}

/// Case-insensitive substring pattern with LIKE wildcards escaped
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn encode_list(items: &[String]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Split a comma-separated form value into trimmed, non-empty terms
pub fn split_terms(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trim, lowercase and de-duplicate terms, keeping first-seen order
pub fn normalize_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Word tokens longer than two characters from the title and description
pub fn extract_keywords(title: &str, description: &str) -> Vec<String> {
    format!("{} {}", title, description)
        .to_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| w.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Existing keywords followed by newly extracted ones, de-duplicated
pub fn merge_keywords(existing: &[String], title: &str, description: &str) -> Vec<String> {
    let mut all = existing.to_vec();
    all.extend(extract_keywords(title, description));
    normalize_terms(&all)
}

/// Human-readable size over Bytes/KB/MB/GB
pub fn format_file_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes <= 0 {
        return "0 Bytes".to_string();
    }

    let bytes = bytes as f64;
    let exponent = ((bytes.ln() / 1024f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = bytes / 1024f64.powi(exponent as i32);
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[exponent])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, NewUser, UserRepository};

    async fn owner(pool: &SqlitePool, email: &str) -> String {
        UserRepository::new(pool)
            .create(&NewUser {
                name: "Owner",
                email,
                password_hash: "hash",
                storage_limit: 1_000_000,
            })
            .await
            .unwrap()
            .id
    }

    fn new_doc(title: &str, is_public: bool) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            description: Some("Lecture notes on graph algorithms".to_string()),
            subject: Some("Computer Science".to_string()),
            is_public,
            keywords: vec![],
            tags: vec!["Exam".to_string(), "exam".to_string()],
            file_url: "/uploads/abc.pdf".to_string(),
            original_file_name: "notes.pdf".to_string(),
            file_type: "pdf".to_string(),
            file_size: 2048,
        }
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }

    #[test]
    fn test_extract_keywords_skips_short_words() {
        let words = extract_keywords("An Intro to Rust", "of traits, and generics");
        assert_eq!(words, vec!["intro", "rust", "traits", "and", "generics"]);
    }

    #[test]
    fn test_extract_keywords_splits_on_non_ascii() {
        let words = extract_keywords("Café Résumé", "naïve_über");
        assert_eq!(words, vec!["caf", "sum", "ve_", "ber"]);
    }

    #[test]
    fn test_merge_keywords_deduplicates_in_order() {
        let merged = merge_keywords(&["Rust".to_string()], "rust basics", "");
        assert_eq!(merged, vec!["rust", "basics"]);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_split_terms() {
        assert_eq!(split_terms(" a, b ,, c"), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_create_populates_owner_and_keywords() {
        let pool = test_pool().await;
        let user_id = owner(&pool, "o@x.com").await;
        let repo = DocumentRepository::new(&pool);

        let doc = repo.create(&user_id, &new_doc("Graph Theory", true)).await.unwrap();
        assert_eq!(doc.owner.email.as_deref(), Some("o@x.com"));
        assert_eq!(doc.tags, vec!["exam"]);
        assert!(doc.keywords.contains(&"graph".to_string()));
        assert!(doc.keywords.contains(&"algorithms".to_string()));
        assert_eq!(doc.filesize_formatted, "2 KB");
        assert_eq!(doc.stored_file_name(), "abc.pdf");
    }

    #[tokio::test]
    async fn test_list_public_filters_private_and_deleted() {
        let pool = test_pool().await;
        let user_id = owner(&pool, "o@x.com").await;
        let repo = DocumentRepository::new(&pool);

        let public = repo.create(&user_id, &new_doc("Public Graphs", true)).await.unwrap();
        repo.create(&user_id, &new_doc("Private Graphs", false)).await.unwrap();
        let deleted = repo.create(&user_id, &new_doc("Deleted Graphs", true)).await.unwrap();
        assert!(repo.soft_delete(&deleted.id).await.unwrap());
        assert!(!repo.soft_delete(&deleted.id).await.unwrap());

        let (docs, total) = repo.list_public(&DocumentFilter::default(), 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(docs[0].id, public.id);
        assert!(repo.get_active(&deleted.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_public_search_and_type_filter() {
        let pool = test_pool().await;
        let user_id = owner(&pool, "o@x.com").await;
        let repo = DocumentRepository::new(&pool);

        repo.create(&user_id, &new_doc("Linear Algebra", true)).await.unwrap();
        let mut docx = new_doc("Organic Chemistry", true);
        docx.file_type = "docx".to_string();
        docx.description = None;
        docx.subject = Some("Chemistry".to_string());
        repo.create(&user_id, &docx).await.unwrap();

        let filter = DocumentFilter {
            search: Some("ALGEBRA".to_string()),
            ..Default::default()
        };
        let (docs, total) = repo.list_public(&filter, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(docs[0].title, "Linear Algebra");

        let filter = DocumentFilter {
            file_type: Some("docx".to_string()),
            subject: Some("chem".to_string()),
            ..Default::default()
        };
        let (docs, _) = repo.list_public(&filter, 10, 0).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "Organic Chemistry");
    }

    #[tokio::test]
    async fn test_search_matches_keyword_values_only() {
        let pool = test_pool().await;
        let user_id = owner(&pool, "o@x.com").await;
        let repo = DocumentRepository::new(&pool);

        let mut tagged = new_doc("Linear Algebra", true);
        tagged.keywords = vec!["topology".to_string(), "manifolds".to_string()];
        repo.create(&user_id, &tagged).await.unwrap();

        let search = |term: &str| DocumentFilter {
            search: Some(term.to_string()),
            ..Default::default()
        };

        let (docs, total) = repo.list_public(&search("TOPO"), 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(docs[0].title, "Linear Algebra");

        // Characters of the stored JSON array never match on their own
        for term in ["\"", ",", "[", "\",\""] {
            let (_, total) = repo.list_public(&search(term), 10, 0).await.unwrap();
            assert_eq!(total, 0, "search for {term:?}");
        }
    }

    #[tokio::test]
    async fn test_update_and_counters() {
        let pool = test_pool().await;
        let user_id = owner(&pool, "o@x.com").await;
        let repo = DocumentRepository::new(&pool);
        let doc = repo.create(&user_id, &new_doc("Draft", false)).await.unwrap();

        let changes = DocumentChanges {
            title: Some("Final Version".to_string()),
            is_public: Some(true),
            ..Default::default()
        };
        let updated = repo.update(&doc, &changes).await.unwrap().unwrap();
        assert_eq!(updated.title, "Final Version");
        assert!(updated.is_public);
        assert!(updated.keywords.contains(&"final".to_string()));
        assert_eq!(updated.subject, doc.subject);

        repo.increment(&doc.id, Counter::View).await.unwrap();
        repo.increment(&doc.id, Counter::View).await.unwrap();
        repo.increment(&doc.id, Counter::Download).await.unwrap();
        let doc = repo.get(&doc.id).await.unwrap().unwrap();
        assert_eq!((doc.view_count, doc.download_count, doc.share_count), (2, 1, 0));
    }

    #[tokio::test]
    async fn test_count_by_type() {
        let pool = test_pool().await;
        let user_id = owner(&pool, "o@x.com").await;
        let repo = DocumentRepository::new(&pool);

        repo.create(&user_id, &new_doc("One", true)).await.unwrap();
        repo.create(&user_id, &new_doc("Two", false)).await.unwrap();
        let mut txt = new_doc("Three", true);
        txt.file_type = "txt".to_string();
        repo.create(&user_id, &txt).await.unwrap();

        let by_type = repo.count_by_type(&user_id).await.unwrap();
        assert_eq!(by_type.get("pdf"), Some(&2));
        assert_eq!(by_type.get("txt"), Some(&1));
        assert_eq!(repo.count_for_owner(&user_id).await.unwrap(), 3);
    }
}
