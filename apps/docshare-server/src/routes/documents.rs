//! Document API endpoints
//!
//! Endpoints:
//! - GET /api/documents - Public documents with search, filters and pagination
//! - POST /api/documents - Upload a document (multipart)
//! - GET /api/documents/my/documents - Caller's own documents
//! - GET /api/documents/:id - Document metadata
//! - PUT /api/documents/:id - Edit metadata (owner only)
//! - DELETE /api/documents/:id - Soft delete (owner only)
//! - GET /api/documents/:id/download - File as an attachment
//! - GET /api/documents/:id/view - File inline, embeddable by external viewers
//! - POST /api/documents/:id/share - Count a share and return the view URL
//! - GET /api/documents/:id/stats - Access statistics (owner only)

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    response::Response,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::extract::JsonBody;
use super::{middleware, record_activity};
use crate::auth::{AuthUser, MaybeUser};
use crate::db::{
    split_terms, ActivityType, ClientInfo, Counter, Document, DocumentChanges, DocumentFilter,
    DocumentRepository, DocumentStatsReport, NewActivity, NewDocument, PageParams, Pagination,
    StatEvent, StatsRepository, UserRepository,
};
use crate::error::{AppError, Result};
use crate::rate_limit::RateLimiter;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Page size when the client does not ask for one
const DEFAULT_PAGE_LIMIT: i64 = 10;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Query parameters for the public listing
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub filetype: Option<String>,
    pub subject: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListQuery {
    fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }

    fn filter(self) -> DocumentFilter {
        DocumentFilter {
            search: self.search.map(|s| s.trim().to_string()),
            file_type: self.filetype,
            subject: self.subject.map(|s| s.trim().to_string()),
        }
    }
}

/// Text fields of the upload form
#[derive(Debug, Default, Validate)]
struct UploadForm {
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    title: String,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    description: Option<String>,
    #[validate(length(max = 100, message = "Subject cannot exceed 100 characters"))]
    subject: Option<String>,
    #[validate(custom(function = "validate_public_flag"))]
    ispublic: Option<String>,
    keywords: Option<String>,
    tags: Option<String>,
}

impl UploadForm {
    fn set(&mut self, name: &str, value: String) {
        let value = value.trim().to_string();
        let optional = (!value.is_empty()).then(|| value.clone());
        match name {
            "title" => self.title = value,
            "description" => self.description = optional,
            "subject" => self.subject = optional,
            "ispublic" => self.ispublic = optional,
            "keywords" => self.keywords = optional,
            "tags" => self.tags = optional,
            other => tracing::debug!("Ignoring unknown upload field '{}'", other),
        }
    }

    fn is_public(&self) -> bool {
        self.ispublic.as_deref() == Some("true")
    }
}

fn validate_public_flag(value: &str) -> std::result::Result<(), ValidationError> {
    match value {
        "true" | "false" => Ok(()),
        _ => Err(ValidationError::new("ispublic")
            .with_message("ispublic must be either 'true' or 'false'".into())),
    }
}

/// Keywords/tags supplied either as a JSON array or a comma-separated string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Terms {
    List(Vec<String>),
    Text(String),
}

impl Terms {
    fn into_vec(self) -> Vec<String> {
        match self {
            Terms::List(items) => items,
            Terms::Text(text) => split_terms(&text),
        }
    }
}

/// Editable document metadata
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDocumentRequest {
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    #[validate(length(max = 100, message = "Subject cannot exceed 100 characters"))]
    pub subject: Option<String>,
    pub ispublic: Option<bool>,
    pub keywords: Option<Terms>,
    pub tags: Option<Terms>,
}

impl UpdateDocumentRequest {
    /// Trim the text fields so length rules apply to what gets stored
    fn normalize(&mut self) {
        for field in [&mut self.title, &mut self.description, &mut self.subject] {
            if let Some(value) = field.as_mut() {
                *value = value.trim().to_string();
            }
        }
    }

    fn into_changes(self) -> DocumentChanges {
        DocumentChanges {
            title: self.title,
            description: self.description,
            subject: self.subject,
            is_public: self.ispublic,
            keywords: self.keywords.map(Terms::into_vec),
            tags: self.tags.map(Terms::into_vec),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentData {
    pub document: Document,
}

#[derive(Debug, Serialize)]
pub struct DocumentListData {
    pub documents: Vec<Document>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareData {
    pub share_url: String,
    pub share_count: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub stats: DocumentStatsReport,
}

// ============================================================================
// Router
// ============================================================================

/// Create the documents router; `max_upload` bounds the multipart body
pub fn router(max_upload: usize, upload_limiter: Option<RateLimiter>) -> Router<AppState> {
    let mut upload = post(upload_document).layer(DefaultBodyLimit::max(max_upload));
    if let Some(limiter) = upload_limiter {
        upload = upload.layer(from_fn_with_state(limiter, middleware::rate_limit));
    }

    Router::new()
        .route("/", get(list_documents).merge(upload))
        .route("/my/documents", get(my_documents))
        .route(
            "/:id",
            get(get_document).put(update_document).delete(delete_document),
        )
        .route("/:id/download", get(download_document))
        .route("/:id/view", get(view_document))
        .route("/:id/share", post(share_document))
        .route("/:id/stats", get(document_stats))
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_id(id: &str) -> Result<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| AppError::BadRequest("Invalid document id".to_string()))
}

/// Load a live document the caller is allowed to read
async fn readable_document(state: &AppState, id: &str, viewer: &MaybeUser) -> Result<Document> {
    validate_id(id)?;

    let document = DocumentRepository::new(state.db())
        .get_active(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    if !document.is_visible_to(viewer.id()) {
        return Err(AppError::Forbidden(
            "You do not have permission to access this document".to_string(),
        ));
    }

    Ok(document)
}

/// Load a live document owned by the caller
async fn owned_document(state: &AppState, id: &str, owner_id: &str) -> Result<Document> {
    validate_id(id)?;

    let document = DocumentRepository::new(state.db())
        .get_active(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    if !document.is_owned_by(owner_id) {
        return Err(AppError::Forbidden(
            "You are not allowed to modify this document".to_string(),
        ));
    }

    Ok(document)
}

/// Bump a counter, record the stat and log the caller's activity
async fn track_access(
    state: &AppState,
    document: &Document,
    viewer: &MaybeUser,
    client: &ClientInfo,
    counter: Counter,
    event: StatEvent,
    activity: ActivityType,
) -> Result<()> {
    DocumentRepository::new(state.db()).increment(&document.id, counter).await?;
    StatsRepository::new(state.db()).record(&document.id, event).await?;

    if let Some(user_id) = viewer.id() {
        let description = format!("{} document: {}", activity_verb(activity), document.title);
        record_activity(
            state.db(),
            NewActivity::new(user_id, activity, description, client).document(&document.id),
        )
        .await;
    }

    Ok(())
}

fn activity_verb(activity: ActivityType) -> &'static str {
    match activity {
        ActivityType::Upload => "Uploaded",
        ActivityType::Download => "Downloaded",
        ActivityType::View => "Viewed",
        ActivityType::Share => "Shared",
        ActivityType::Save => "Saved",
        ActivityType::Delete => "Deleted",
        ActivityType::Login | ActivityType::Register => "Accessed",
    }
}

fn content_type_for(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// `<disposition>; filename="..."; filename*=UTF-8''...`
fn content_disposition(disposition: &str, file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && c != '"' && c != '\\' && !c.is_ascii_control() { c } else { '_' })
        .collect();
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition,
        ascii,
        urlencoding::encode(file_name)
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/documents
async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<DocumentListData>> {
    let (page, limit) = query.page_params().resolve(DEFAULT_PAGE_LIMIT);
    let filter = query.filter();

    let repo = DocumentRepository::new(state.db());
    let offset = Pagination::new(page, limit, 0).offset();
    let (documents, total) = repo.list_public(&filter, limit, offset).await?;

    Ok(ApiResponse::ok(DocumentListData {
        documents,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// GET /api/documents/my/documents
async fn my_documents(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<DocumentListData>> {
    let (page, limit) = params.resolve(DEFAULT_PAGE_LIMIT);
    let pagination = Pagination::new(page, limit, 0);

    let (documents, total) = DocumentRepository::new(state.db())
        .list_for_owner(&user.id, limit, pagination.offset())
        .await?;

    Ok(ApiResponse::ok(DocumentListData {
        documents,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// POST /api/documents
///
/// The file type is checked as soon as the file part arrives, before its
/// body is read; nothing touches disk or the database until every check
/// has passed.
async fn upload_document(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    client: ClientInfo,
    mut multipart: Multipart,
) -> Result<ApiResponse<DocumentData>> {
    let files = state.files();
    let mut form = UploadForm::default();
    let mut upload: Option<(String, String, axum::body::Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            if name != "file" {
                tracing::debug!("Ignoring file in unexpected field '{}'", name);
                continue;
            }
            if upload.is_some() {
                return Err(AppError::BadRequest("Only one file can be uploaded at a time".to_string()));
            }

            let extension = files.check_file_type(&file_name)?;
            let data = field.bytes().await?;
            files.check_size(data.len() as u64)?;

            upload = Some((file_name, extension, data));
        } else {
            form.set(&name, field.text().await?);
        }
    }

    let (original_file_name, extension, data) =
        upload.ok_or_else(|| AppError::BadRequest("Please upload a file".to_string()))?;
    form.validate()?;

    let stored = files.save(&extension, &data).await?;
    let size = stored.size as i64;

    let users = UserRepository::new(state.db());
    let reserved = match users.reserve_storage(&user.id, size).await {
        Ok(reserved) => reserved,
        Err(e) => {
            files.remove(&stored.file_name).await;
            return Err(e);
        }
    };
    if !reserved {
        files.remove(&stored.file_name).await;
        tracing::info!(user_id = %user.id, size, "Upload rejected: storage limit exceeded");
        return Err(AppError::BadRequest("Storage limit exceeded".to_string()));
    }

    let is_public = form.is_public();
    let new_document = NewDocument {
        title: form.title,
        description: form.description,
        subject: form.subject,
        is_public,
        keywords: form.keywords.as_deref().map(split_terms).unwrap_or_default(),
        tags: form.tags.as_deref().map(split_terms).unwrap_or_default(),
        file_url: stored.file_url.clone(),
        original_file_name,
        file_type: extension,
        file_size: size,
    };

    let document = match DocumentRepository::new(state.db()).create(&user.id, &new_document).await {
        Ok(document) => document,
        Err(e) => {
            files.remove(&stored.file_name).await;
            if let Err(release_err) = users.release_storage(&user.id, size).await {
                tracing::warn!(user_id = %user.id, "Failed to release storage: {}", release_err);
            }
            return Err(e);
        }
    };

    if let Err(e) = StatsRepository::new(state.db()).init(&document.id).await {
        tracing::warn!(document_id = %document.id, "Failed to initialize stats: {}", e);
    }

    record_activity(
        state.db(),
        NewActivity::new(
            &user.id,
            ActivityType::Upload,
            format!("Uploaded document: {}", document.title),
            &client,
        )
        .document(&document.id),
    )
    .await;

    tracing::info!(
        document_id = %document.id,
        user_id = %user.id,
        file_type = %document.file_type,
        size,
        "Document uploaded"
    );

    Ok(ApiResponse::created(DocumentData { document }).with_message("Document uploaded successfully"))
}

/// GET /api/documents/:id
async fn get_document(
    State(state): State<AppState>,
    viewer: MaybeUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<ApiResponse<DocumentData>> {
    let mut document = readable_document(&state, &id, &viewer).await?;

    track_access(
        &state,
        &document,
        &viewer,
        &client,
        Counter::View,
        StatEvent::View,
        ActivityType::View,
    )
    .await?;
    document.view_count += 1;

    Ok(ApiResponse::ok(DocumentData { document }))
}

/// GET /api/documents/:id/download
async fn download_document(
    State(state): State<AppState>,
    viewer: MaybeUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<Response> {
    let document = readable_document(&state, &id, &viewer).await?;
    let bytes = state.files().read(document.stored_file_name()).await?;

    track_access(
        &state,
        &document,
        &viewer,
        &client,
        Counter::Download,
        StatEvent::Download,
        ActivityType::Download,
    )
    .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&document.original_file_name))
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition("attachment", &document.original_file_name),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// GET /api/documents/:id/view
///
/// Served with permissive cross-origin headers so hosted viewers can embed it.
async fn view_document(
    State(state): State<AppState>,
    viewer: MaybeUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<Response> {
    let document = readable_document(&state, &id, &viewer).await?;
    let bytes = state.files().read(document.stored_file_name()).await?;

    track_access(
        &state,
        &document,
        &viewer,
        &client,
        Counter::View,
        StatEvent::View,
        ActivityType::View,
    )
    .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&document.original_file_name))
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition("inline", &document.original_file_name),
        )
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header("Cross-Origin-Resource-Policy", "cross-origin")
        .header("Cross-Origin-Embedder-Policy", "unsafe-none")
        .header(header::CONTENT_SECURITY_POLICY, "frame-ancestors *")
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// POST /api/documents/:id/share
async fn share_document(
    State(state): State<AppState>,
    viewer: MaybeUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<ApiResponse<ShareData>> {
    let document = readable_document(&state, &id, &viewer).await?;

    track_access(
        &state,
        &document,
        &viewer,
        &client,
        Counter::Share,
        StatEvent::Share,
        ActivityType::Share,
    )
    .await?;

    Ok(ApiResponse::ok(ShareData {
        share_url: format!("/api/documents/{}/view", document.id),
        share_count: document.share_count + 1,
    }))
}

/// GET /api/documents/:id/stats
async fn document_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<StatsData>> {
    let document = owned_document(&state, &id, &user.id).await?;

    let stats = StatsRepository::new(state.db());
    stats.init(&document.id).await?;
    let report = stats
        .report(&document.id)
        .await?
        .ok_or_else(|| AppError::Internal("Missing statistics row".to_string()))?;

    Ok(ApiResponse::ok(StatsData { stats: report }))
}

/// PUT /api/documents/:id
async fn update_document(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(mut req): JsonBody<UpdateDocumentRequest>,
) -> Result<ApiResponse<DocumentData>> {
    req.normalize();
    req.validate()?;
    let document = owned_document(&state, &id, &user.id).await?;

    let updated = DocumentRepository::new(state.db())
        .update(&document, &req.into_changes())
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    tracing::info!(document_id = %updated.id, "Document updated");

    Ok(ApiResponse::ok(DocumentData { document: updated }).with_message("Document updated successfully"))
}

/// DELETE /api/documents/:id
///
/// Soft delete: the row is flagged and the file stays on disk, but the
/// owner's storage usage is released.
async fn delete_document(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>> {
    let document = owned_document(&state, &id, &user.id).await?;

    if !DocumentRepository::new(state.db()).soft_delete(&document.id).await? {
        return Err(AppError::NotFound("Document not found".to_string()));
    }
    UserRepository::new(state.db())
        .release_storage(&user.id, document.file_size)
        .await?;

    record_activity(
        state.db(),
        NewActivity::new(
            &user.id,
            ActivityType::Delete,
            format!("Deleted document: {}", document.title),
            &client,
        )
        .document(&document.id),
    )
    .await;

    tracing::info!(document_id = %document.id, user_id = %user.id, "Document deleted");

    Ok(ApiResponse::message("Document deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_form_validation() {
        let mut form = UploadForm::default();
        form.set("title", "  Notes  ".to_string());
        form.set("ispublic", "true".to_string());
        form.set("description", "   ".to_string());
        assert_eq!(form.title, "Notes");
        assert!(form.description.is_none());
        assert!(form.validate().is_ok());
        assert!(form.is_public());

        form.set("ispublic", "yes".to_string());
        assert!(form.validate().unwrap_err().field_errors().contains_key("ispublic"));

        form.set("ispublic", "false".to_string());
        form.set("title", "ab".to_string());
        assert!(form.validate().unwrap_err().field_errors().contains_key("title"));
    }

    #[test]
    fn test_private_by_default() {
        let mut form = UploadForm::default();
        form.set("title", "Lecture".to_string());
        assert!(!form.is_public());
    }

    #[test]
    fn test_terms_accept_list_or_text() {
        let req: UpdateDocumentRequest =
            serde_json::from_str(r#"{"keywords": ["a", "b"], "tags": "x, y"}"#).unwrap();
        let changes = req.into_changes();
        assert_eq!(changes.keywords, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(changes.tags, Some(vec!["x".to_string(), "y".to_string()]));
        assert!(changes.title.is_none());
    }

    #[test]
    fn test_update_title_is_trimmed_before_validation() {
        let mut req: UpdateDocumentRequest = serde_json::from_str(r#"{"title": "  ab  "}"#).unwrap();
        req.normalize();
        assert!(req.validate().unwrap_err().field_errors().contains_key("title"));

        let mut req: UpdateDocumentRequest =
            serde_json::from_str(r#"{"title": "  Final  ", "subject": " Math "}"#).unwrap();
        req.normalize();
        assert!(req.validate().is_ok());
        let changes = req.into_changes();
        assert_eq!(changes.title.as_deref(), Some("Final"));
        assert_eq!(changes.subject.as_deref(), Some("Math"));
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id(&Uuid::new_v4().to_string()).is_ok());
        assert!(matches!(validate_id("not-a-uuid"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_content_disposition_encodes_name() {
        assert_eq!(
            content_disposition("attachment", "résumé \"final\".pdf"),
            "attachment; filename=\"r_sum_ _final_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9%20%22final%22.pdf"
        );
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("notes.pdf"), "application/pdf");
        assert_eq!(content_type_for("notes.txt"), "text/plain");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
    }
}
