use async_trait::async_trait;
use lettre::address::AddressError;
use thiserror::Error;

use crate::services::token_issuer::TokenKind;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid Address: {0}")]
    InvalidEmailAddress(String),
    #[error("Send error: {0}")]
    SendError(String),
    #[error("Env Var Missing: {0}")]
    EnvVarMissing(String),
    #[error("Error: {0}")]
    Other(String),
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        MailError::SendError(err.to_string())
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        MailError::SendError(err.to_string())
    }
}

impl From<AddressError> for MailError {
    fn from(e: AddressError) -> Self {
        MailError::InvalidEmailAddress(e.to_string())
    }
}

/// Notification sender for account emails.
///
/// `token` is the verification token, reset token or OTP code, depending on `kind`.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        kind: TokenKind,
        to: &str,
        name: &str,
        token: &str,
    ) -> Result<(), MailError>;
}

mod mock_mailer;
mod smtp_impl;
mod templates;

pub use mock_mailer::{MockMailer, SentEmail};
pub use smtp_impl::{SmtpMailer, SmtpSettings};
pub use templates::{render, EmailLinks, RenderedEmail};
