use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use uuid::Uuid;

use crate::{error::AppError, users::User};

/// User resolved from the session cookie by the session middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Session id of the authenticated request.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionId>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// Path id parsed into a UUID, rejecting with the usual error body.
pub struct UserId(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(raw) =
            axum::extract::Path::<String>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::validation("missing user id"))?;
        Uuid::parse_str(raw.trim())
            .map(UserId)
            .map_err(|_| AppError::validation("user id must be a UUID"))
    }
}
