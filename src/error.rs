use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

/// Every handler error ends up as `{"error": <code>, "message": <text>}`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A required integration is not configured.
    #[error("{message}")]
    Config { code: &'static str, message: String },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        AppError::BadRequest { code, message: message.into() }
    }

    pub fn config(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Config { code, message: message.into() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config { .. }
            | AppError::Database(_)
            | AppError::Serialization(_)
            | AppError::Upstream(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest { code, .. } | AppError::Config { code, .. } => code,
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Database(_) => "database_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Upstream(_) => "upstream_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs.
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                "could not process".to_string()
            }
            AppError::Upstream(e) => {
                tracing::error!("upstream error: {}", e);
                "upstream service unavailable".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
