//! Typed errors and HTTP mapping.

use crate::response::Envelope;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::path::PathBuf;
use thiserror::Error;

/// A model descriptor (or runtime setting) that cannot be used as declared. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("model {model} declares no fields")]
    NoFields { model: String },
    #[error("model {model} declares no primary key")]
    MissingPrimaryKey { model: String },
    #[error("model {model}: primary key declared in both '{first}' and '{second}'")]
    ConflictingPrimaryKey {
        model: String,
        first: String,
        second: String,
    },
    #[error("model {model}: duplicate column '{column}'")]
    DuplicateColumn { model: String, column: String },
    #[error("model {model}: {reason}")]
    Unsupported { model: String, reason: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("generate migration for {model}: {reason}")]
    Generation { model: String, reason: String },
    #[error("apply migration {version} ({name}) failed on `{statement}`: {source}")]
    Apply {
        version: String,
        name: String,
        statement: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("io {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }
}

/// True when the driver reports a unique/primary key violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Config(_) | AppError::Generation { .. } | AppError::Apply { .. } | AppError::Io { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    StatusCode::NOT_FOUND
                } else if is_unique_violation(e) {
                    StatusCode::CONFLICT
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(Envelope::<()>::failure(self.to_string()))).into_response()
    }
}
