use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// DbError
///
/// Classifies the failures the persistence layer can report. Unique constraint violations
/// are the only storage error with a client-facing meaning; everything else is opaque.
#[derive(Error, Debug)]
pub enum DbError {
    /// A row with the same natural key already exists.
    #[error("{message}")]
    UniqueViolation { message: String },

    /// Any other driver or connection failure.
    #[error(transparent)]
    Other(#[from] sqlx::Error),
}

impl DbError {
    /// classify
    ///
    /// Maps a raw `sqlx::Error` into a `DbError`, keeping the driver text of unique violations
    /// so the 409 response can echo it.
    pub fn classify(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DbError::UniqueViolation {
                    message: db_err.message().to_string(),
                };
            }
        }
        DbError::Other(err)
    }
}

/// ApiError
///
/// Every failure a handler or the auth gate can produce. Each variant renders as
/// `{"msg": "..."}` with its matching status code.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No cookie or token was presented, or the hub did not recognise it.
    #[error("Could not authenticate user, missing cookie or token")]
    AuthenticationMissing,

    /// The caller was identified but the access policy rejected them.
    #[error("Could not authenticate user, {0}")]
    AuthorizationDenied(String),

    /// The request body was missing or could not be turned into a record.
    #[error("{0}")]
    Validation(String),

    /// A record with the same key already exists.
    #[error("Error creating; {0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Database(DbError),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UniqueViolation { message } => ApiError::Conflict(message),
            other => ApiError::Database(other),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthenticationMissing | ApiError::AuthorizationDenied(_) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-safe message. Storage failures never leak driver details.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Database(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Database(_) => tracing::error!("Internal service error: {:#}", self),
            ApiError::Conflict(_) => tracing::warn!("Conflict error: {}", self),
            ApiError::AuthenticationMissing | ApiError::AuthorizationDenied(_) => {
                tracing::info!("Authorization error: {}", self)
            }
            ApiError::Validation(_) | ApiError::NotFound(_) => {
                tracing::debug!("Client error: {}", self)
            }
        }

        let status = self.status_code();
        (status, Json(json!({ "msg": self.user_message() }))).into_response()
    }
}
