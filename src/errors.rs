use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Operational error taxonomy for the auth pipeline.
///
/// Every variant maps to a stable status code and a message that does not
/// reveal which specific check failed. Integrity failures (malformed stored
/// hashes and the like) go through `Internal`, which logs the full chain and
/// renders a generic body.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("This account has been deactivated")]
    AccountInactive,

    #[error("Password must be at least 8 characters long")]
    WeakPassword,

    #[error("You are not logged in. Please log in to get access")]
    Unauthenticated,

    #[error("Invalid token. Please log in again")]
    InvalidToken,

    #[error("Your session has expired. Please log in again")]
    ExpiredToken,

    #[error("Password was changed recently. Please log in again")]
    StaleToken,

    #[error("Token is invalid or has expired")]
    InvalidOrExpiredResetToken,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Email already in use")]
    EmailTaken,

    #[error("No user found with that ID")]
    NotFound,

    #[error("{0}")]
    Validation(&'static str),

    #[error("Service temporarily unavailable, please retry")]
    Unavailable,

    #[error("Something went wrong")]
    Internal(anyhow::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::AccountInactive
            | AuthError::Unauthenticated
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::StaleToken => StatusCode::UNAUTHORIZED,
            AuthError::WeakPassword
            | AuthError::InvalidOrExpiredResetToken
            | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(ref source) = self {
            error!(error = ?source, "internal error while handling request");
        }
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        // A unique-constraint hit is a client conflict (the email column is
        // the only unique one), not an infrastructure failure.
        if e.as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false)
        {
            return AuthError::EmailTaken;
        }
        error!(error = %e, "database error");
        AuthError::Unavailable
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(e: anyhow::Error) -> Self {
        AuthError::Internal(e)
    }
}
