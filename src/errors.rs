use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::{responses::JsonResponse, services::token_issuer::TokenKind};

/// Every way an account operation can fail, as seen by the caller.
///
/// `Display` is the user-facing message. Nothing here may reveal which of
/// email or password was wrong, so both map to [`AuthError::InvalidCredentials`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Email already registered")]
    Conflict,
    #[error("User not found")]
    NotFound,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Please verify your email before logging in")]
    UnverifiedAccount,
    #[error("{}", .0.invalid_message())]
    InvalidToken(TokenKind),
    #[error("Email already verified")]
    AlreadyVerified,
    #[error("{}", .0.delivery_failure_message())]
    Delivery(TokenKind),
    #[error("{message}")]
    Internal {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        AuthError::Validation(message.into())
    }

    pub fn internal(message: &'static str, source: impl Into<anyhow::Error>) -> Self {
        AuthError::Internal {
            message,
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::Conflict
            | AuthError::InvalidToken(_)
            | AuthError::AlreadyVerified => StatusCode::BAD_REQUEST,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::InvalidCredentials | AuthError::UnverifiedAccount => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Delivery(_) | AuthError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine tag sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation_error",
            AuthError::Conflict => "conflict_error",
            AuthError::NotFound => "not_found",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::UnverifiedAccount => "unverified_account",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::AlreadyVerified => "already_verified",
            AuthError::Delivery(_) => "delivery_error",
            AuthError::Internal { .. } => "internal_error",
        }
    }

    /// Logs operator detail for failures the caller only sees generically.
    pub fn log(&self) {
        match self {
            AuthError::Internal { message, source } => {
                error!(error = ?source, "{}", message);
            }
            AuthError::Delivery(kind) => {
                error!(kind = %kind, "notification delivery failed");
            }
            _ => {}
        }
    }
}

/// Unreadable request bodies are reported like any other validation failure.
impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        JsonResponse::error(self.status(), &self.to_string(), self.code()).into_response()
    }
}
