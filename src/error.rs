//! Request-level error taxonomy and its HTTP mapping

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::profile::ProfileError;
use crate::progress::ProgressError;
use crate::subscription::SubscriptionError;
use crate::tier::middleware::TierErrorResponse;

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or out-of-range input. Nothing was changed.
    #[error("{0}")]
    Validation(String),
    #[error("Sign in required")]
    NotAuthenticated,
    #[error("Not allowed")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{}", .0.error)]
    LimitReached(Box<TierErrorResponse>),
    /// The backing store failed to read or write
    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotAuthenticated => "NOT_AUTHENTICATED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::LimitReached(_) => "LIMIT_REACHED",
            AppError::Storage(_) => "UPSTREAM_FAILURE",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::LimitReached(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(e) => {
                tracing::error!("Storage failure: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        match self {
            AppError::LimitReached(limit) => (*limit).into_response(),
            other => (
                status,
                Json(json!({ "error": other.to_string(), "code": other.code() })),
            )
                .into_response(),
        }
    }
}

impl From<ProgressError> for AppError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::UnknownTheme(_) | ProgressError::UnknownPuzzle { .. } => {
                AppError::NotFound(err.to_string())
            }
            ProgressError::Io(_) | ProgressError::Json(_) => AppError::Storage(err.into()),
        }
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Invalid(msg) => AppError::Validation(msg),
            SubscriptionError::Io(_) | SubscriptionError::Json(_) => AppError::Storage(err.into()),
        }
    }
}

impl From<ProfileError> for AppError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::Rating(e) => AppError::Validation(e.to_string()),
            ProfileError::Io(_) | ProfileError::Json(_) => AppError::Storage(err.into()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
