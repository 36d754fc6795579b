//! User dashboard endpoints: profile, statistics, activity history and bookmarks

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::extract::JsonBody;
use super::record_activity;
use crate::auth::{AuthUser, RequireAdmin};
use crate::db::{
    Activity, ActivityRepository, ActivityType, Bookmark, BookmarkRepository, BookmarkWithDocument,
    ClientInfo, DocumentRepository, NewActivity, PageParams, Pagination, UserProfile,
    UserRepository, UserStats,
};
use crate::error::{is_unique_violation, AppError, Result};
use crate::response::ApiResponse;
use crate::state::AppState;

const DEFAULT_ACTIVITY_LIMIT: i64 = 20;
const DEFAULT_BOOKMARK_LIMIT: i64 = 10;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct BookmarkRequest {
    #[validate(length(max = 500, message = "Note cannot exceed 500 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct ProfileData {
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub stats: UserStats,
}

#[derive(Debug, Serialize)]
pub struct ActivityListData {
    pub activities: Vec<Activity>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct BookmarkListData {
    pub bookmarks: Vec<BookmarkWithDocument>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct BookmarkData {
    pub bookmark: Bookmark,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/stats", get(stats))
        .route("/activities", get(activities))
        .route("/bookmarks", get(bookmarks))
        .route("/bookmarks/:document_id", post(add_bookmark).delete(remove_bookmark))
        .route("/:id/status", put(set_status))
}

/// GET /api/users/profile
async fn profile(AuthUser(user): AuthUser) -> ApiResponse<ProfileData> {
    ApiResponse::ok(ProfileData { user: user.profile() })
}

/// GET /api/users/stats
async fn stats(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<ApiResponse<StatsData>> {
    let stats = UserStats::collect(state.db(), &user).await?;
    Ok(ApiResponse::ok(StatsData { stats }))
}

/// GET /api/users/activities
async fn activities(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<ActivityListData>> {
    let (page, limit) = params.resolve(DEFAULT_ACTIVITY_LIMIT);
    let offset = Pagination::new(page, limit, 0).offset();

    let (activities, total) = ActivityRepository::new(state.db())
        .list(&user.id, limit, offset)
        .await?;

    Ok(ApiResponse::ok(ActivityListData {
        activities,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// GET /api/users/bookmarks
async fn bookmarks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<BookmarkListData>> {
    let (page, limit) = params.resolve(DEFAULT_BOOKMARK_LIMIT);
    let offset = Pagination::new(page, limit, 0).offset();

    let (bookmarks, total) = BookmarkRepository::new(state.db())
        .list_for_user(&user.id, limit, offset)
        .await?;

    Ok(ApiResponse::ok(BookmarkListData {
        bookmarks,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// POST /api/users/bookmarks/:document_id
async fn add_bookmark(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    client: ClientInfo,
    Path(document_id): Path<String>,
    body: Option<Json<BookmarkRequest>>,
) -> Result<ApiResponse<BookmarkData>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    req.validate()?;

    let document = DocumentRepository::new(state.db())
        .get_active(&document_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    if !document.is_visible_to(Some(&user.id)) {
        return Err(AppError::Forbidden(
            "You do not have permission to bookmark this document".to_string(),
        ));
    }

    let repo = BookmarkRepository::new(state.db());
    let already_saved = || AppError::BadRequest("Document already bookmarked".to_string());
    if repo.find(&user.id, &document.id).await?.is_some() {
        return Err(already_saved());
    }

    let note = req.note.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let bookmark = repo
        .create(&user.id, &document.id, note)
        .await
        .map_err(|e| match e {
            AppError::Database(ref db) if is_unique_violation(db) => already_saved(),
            other => other,
        })?;

    record_activity(
        state.db(),
        NewActivity::new(
            &user.id,
            ActivityType::Save,
            format!("Saved document: {}", document.title),
            &client,
        )
        .document(&document.id),
    )
    .await;

    Ok(ApiResponse::created(BookmarkData { bookmark }).with_message("Document bookmarked successfully"))
}

/// DELETE /api/users/bookmarks/:document_id
async fn remove_bookmark(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(document_id): Path<String>,
) -> Result<ApiResponse<()>> {
    if !BookmarkRepository::new(state.db())
        .delete(&user.id, &document_id)
        .await?
    {
        return Err(AppError::NotFound("Bookmark not found".to_string()));
    }

    Ok(ApiResponse::message("Bookmark removed successfully"))
}

/// PUT /api/users/:id/status (admin only)
async fn set_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UserStatusRequest>,
) -> Result<ApiResponse<ProfileData>> {
    if id == admin.id && !req.is_active {
        return Err(AppError::BadRequest("You cannot deactivate your own account".to_string()));
    }

    let users = UserRepository::new(state.db());
    if !users.set_active(&id, req.is_active).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    let user = users
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user.id, admin_id = %admin.id, is_active = req.is_active, "Account status changed");

    Ok(ApiResponse::ok(ProfileData { user: user.profile() }))
}
