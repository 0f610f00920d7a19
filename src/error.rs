use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestError {
    pub error: String,
    pub status: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
    #[error("deadline exceeded")]
    Timeout,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        AppError::Storage(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Storage(_) | AppError::Timeout => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client. Driver and SDK details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Storage(_) => "Internal Server Error".into(),
            AppError::Timeout => "Request Timeout".into(),
            other => other.to_string(),
        }
    }

    pub fn to_rest(&self) -> RestError {
        RestError {
            error: self.public_message(),
            status: self.status().as_u16(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("record"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("Email already registered".into())
            }
            other => AppError::Storage(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(self.to_rest())).into_response()
    }
}
