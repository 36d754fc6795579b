//! Request extractors for authenticated routes

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts},
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::db::{ClientInfo, Role, User, UserRepository};
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller; rejects with 401 when the token is missing or invalid
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// The caller if a valid token was supplied, otherwise anonymous
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// An authenticated caller with the admin role; rejects with 403 otherwise
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub User);

impl MaybeUser {
    pub fn id(&self) -> Option<&str> {
        self.0.as_ref().map(|u| u.id.as_str())
    }
}

/// Resolve a bearer token to an active user
async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = state.jwt().verify(token).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        AppError::Unauthorized("Invalid token".to_string())
    })?;

    let user = UserRepository::new(state.db())
        .get(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;

    if !user.is_active {
        return Err(AppError::Unauthorized("Account has been deactivated".to_string()));
    }

    Ok(user)
}

async fn bearer_token(parts: &mut Parts) -> Result<String, AppError> {
    match parts.extract::<TypedHeader<Authorization<Bearer>>>().await {
        Ok(TypedHeader(Authorization(bearer))) => Ok(bearer.token().to_string()),
        Err(e) if e.is_missing() => Err(AppError::Unauthorized(
            "Access denied, token is missing".to_string(),
        )),
        Err(_) => Err(AppError::Unauthorized("Invalid token".to_string())),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).await?;
        Ok(AuthUser(authenticate(state, &token).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Ok(token) = bearer_token(parts).await else {
            return Ok(MaybeUser(None));
        };

        match authenticate(state, &token).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(e) => {
                tracing::debug!("Ignoring optional credentials: {}", e);
                Ok(MaybeUser(None))
            }
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role() != Role::Admin {
            return Err(AppError::Forbidden(format!(
                "Role {} is not allowed to access this resource",
                user.role().as_str()
            )));
        }
        Ok(RequireAdmin(user))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|ip| !ip.is_empty())
            .or_else(|| header("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });

        Ok(ClientInfo {
            ip_address,
            user_agent: header(USER_AGENT.as_str()),
        })
    }
}
