use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::Mailbox,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::info;

use crate::services::{
    smtp_mailer::{render, EmailLinks, Mailer},
    token_issuer::TokenKind,
};

use super::MailError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub tls_disabled: bool,
}

impl SmtpSettings {
    pub fn from_env() -> Result<Self, MailError> {
        let var = |key: &str| {
            std::env::var(key).map_err(|_| MailError::EnvVarMissing(key.to_string()))
        };

        let port = var("SMTP_PORT")?
            .parse()
            .map_err(|_| MailError::Other("SMTP_PORT must be a port number".into()))?;

        let tls_disabled = std::env::var("SMTP_TLS_DISABLED")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        Ok(Self {
            host: var("SMTP_HOST")?,
            port,
            username: var("SMTP_USERNAME")?,
            password: var("SMTP_PASSWORD")?,
            from: var("SMTP_FROM")?,
            tls_disabled,
        })
    }
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    sender: Mailbox,
    links: EmailLinks,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings, links: EmailLinks) -> Result<Self, MailError> {
        let sender: Mailbox = settings.from.parse()?;

        let transport = if settings.tls_disabled {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
                .port(settings.port)
                .build()
        } else {
            let creds = Credentials::new(settings.username.clone(), settings.password.clone());
            let tls = TlsParameters::new(settings.host.clone())?;

            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
                .port(settings.port)
                .tls(Tls::Required(tls))
                .credentials(creds)
                .build()
        };

        Ok(Self {
            transport: Arc::new(transport),
            sender,
            links,
        })
    }

    async fn send_email(&self, to: &str, subject: &str, body: String) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.sender.clone())
            .to(to
                .parse()
                .map_err(|e: AddressError| MailError::InvalidEmailAddress(e.to_string()))?)
            .subject(subject)
            .body(body)?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| e.into())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        kind: TokenKind,
        to: &str,
        name: &str,
        token: &str,
    ) -> Result<(), MailError> {
        let email = render(kind, name, token, &self.links);
        self.send_email(to, email.subject, email.body).await?;
        info!(kind = %kind, "account email sent");
        Ok(())
    }
}
