//! Account endpoints
//!
//! Endpoints:
//! - POST /api/auth/register - Create an account and return a token
//! - POST /api/auth/login - Exchange credentials for a token
//! - GET /api/auth/me - Current user
//! - PUT /api/auth/updatedetails - Change name and/or email
//! - PUT /api/auth/updatepassword - Change password and return a fresh token

use std::borrow::Cow;

use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::extract::JsonBody;
use super::record_activity;
use crate::auth::{hash_password, verify_password, AuthUser};
use crate::db::{ActivityType, ClientInfo, NewActivity, NewUser, User, UserProfile, UserRepository};
use crate::error::{is_unique_violation, AppError, Result};
use crate::response::ApiResponse;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDetailsRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthData {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: UserProfile,
}

/// At least 6 characters with a lowercase letter, an uppercase letter and a digit
fn validate_password_strength(password: &str) -> std::result::Result<(), ValidationError> {
    let strong = password.chars().count() >= 6
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit());

    if strong {
        Ok(())
    } else {
        Err(ValidationError::new("password_strength").with_message(Cow::Borrowed(
            "Password must be at least 6 characters and contain at least one uppercase letter, one lowercase letter, and one number",
        )))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/updatedetails", put(update_details))
        .route("/updatepassword", put(update_password))
}

// ============================================================================
// Handlers
// ============================================================================

fn token_response(state: &AppState, user: &User) -> Result<AuthData> {
    Ok(AuthData {
        user: user.profile(),
        token: state.jwt().issue(&user.id)?,
    })
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    JsonBody(mut req): JsonBody<RegisterRequest>,
) -> Result<ApiResponse<AuthData>> {
    req.name = req.name.trim().to_string();
    req.email = normalize_email(&req.email);
    req.validate()?;

    let users = UserRepository::new(state.db());
    if users.find_by_email(&req.email).await?.is_some() {
        return Err(AppError::BadRequest("User already exists with this email".to_string()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = users
        .create(&NewUser {
            name: &req.name,
            email: &req.email,
            password_hash: &password_hash,
            storage_limit: state.config().uploads.default_storage_limit,
        })
        .await
        .map_err(|e| match e {
            AppError::Database(ref db) if is_unique_violation(db) => {
                AppError::BadRequest("User already exists with this email".to_string())
            }
            other => other,
        })?;

    tracing::info!(user_id = %user.id, "User registered");

    record_activity(
        state.db(),
        NewActivity::new(&user.id, ActivityType::Register, "User registered".to_string(), &client),
    )
    .await;

    Ok(ApiResponse::created(token_response(&state, &user)?).with_message("User registered successfully"))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    JsonBody(mut req): JsonBody<LoginRequest>,
) -> Result<ApiResponse<AuthData>> {
    req.email = normalize_email(&req.email);
    req.validate()?;

    let users = UserRepository::new(state.db());
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = users.find_by_email(&req.email).await?.ok_or_else(invalid)?;
    if !verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
        return Err(invalid());
    }
    if !user.is_active {
        return Err(AppError::Unauthorized("Account has been deactivated".to_string()));
    }

    let user = users
        .touch_last_login(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    record_activity(
        state.db(),
        NewActivity::new(&user.id, ActivityType::Login, "User logged in".to_string(), &client),
    )
    .await;

    Ok(ApiResponse::ok(token_response(&state, &user)?).with_message("Login successful"))
}

/// GET /api/auth/me
async fn me(AuthUser(user): AuthUser) -> ApiResponse<UserData> {
    ApiResponse::ok(UserData { user: user.profile() })
}

/// PUT /api/auth/updatedetails
async fn update_details(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(mut req): JsonBody<UpdateDetailsRequest>,
) -> Result<ApiResponse<UserData>> {
    req.name = req.name.map(|n| n.trim().to_string());
    req.email = req.email.map(|e| normalize_email(&e));
    req.validate()?;

    let users = UserRepository::new(state.db());
    let email_taken = || AppError::BadRequest("Email is already in use".to_string());

    if let Some(email) = req.email.as_deref().filter(|e| *e != user.email) {
        if users.find_by_email(email).await?.is_some() {
            return Err(email_taken());
        }
    }

    let updated = users
        .update_details(&user.id, req.name.as_deref(), req.email.as_deref())
        .await
        .map_err(|e| match e {
            AppError::Database(ref db) if is_unique_violation(db) => email_taken(),
            other => other,
        })?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok(UserData { user: updated.profile() }).with_message("User details updated"))
}

/// PUT /api/auth/updatepassword
async fn update_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<UpdatePasswordRequest>,
) -> Result<ApiResponse<AuthData>> {
    req.validate()?;

    if !verify_password(&req.current_password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
    }

    let password_hash = hash_password(&req.new_password)?;
    UserRepository::new(state.db())
        .update_password(&user.id, &password_hash)
        .await?;

    tracing::info!(user_id = %user.id, "Password changed");

    Ok(ApiResponse::ok(token_response(&state, &user)?).with_message("Password updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Aa123456").is_ok());
        assert!(validate_password_strength("Aa1").is_err());
        assert!(validate_password_strength("aa123456").is_err());
        assert!(validate_password_strength("AA123456").is_err());
        assert!(validate_password_strength("Aabcdefg").is_err());
    }

    #[test]
    fn test_register_validation_reports_fields() {
        let req = RegisterRequest {
            name: "A".to_string(),
            email: "not-an-email".to_string(),
            password: "weak".to_string(),
        };
        let err = req.validate().unwrap_err();
        let fields = err.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_update_details_allows_partial() {
        let req = UpdateDetailsRequest {
            name: None,
            email: Some("new@x.com".to_string()),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
