use crate::services::{
    smtp_mailer::{MailError, Mailer},
    token_issuer::TokenKind,
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub kind: TokenKind,
    pub to: String,
    pub name: String,
    pub token: String,
}

/// A mock mailer that records sent emails for testing purposes.
#[derive(Debug, Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<SentEmail>>,
    pub fail_send: AtomicBool,
}

impl MockMailer {
    pub fn set_failing(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Token carried by the most recent email of `kind`.
    pub fn last_token(&self, kind: TokenKind) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|email| email.kind == kind)
            .map(|email| email.token)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(
        &self,
        kind: TokenKind,
        to: &str,
        name: &str,
        token: &str,
    ) -> Result<(), MailError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(MailError::Other("mock failure".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(SentEmail {
                kind,
                to: to.to_string(),
                name: name.to_string(),
                token: token.to_string(),
            });
        Ok(())
    }
}
