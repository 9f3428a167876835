use crate::services::token_issuer::TokenKind;

/// Where the frontend serves the pages that consume emailed tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailLinks {
    pub frontend_origin: String,
    pub verification_path: String,
    pub reset_path: String,
}

impl EmailLinks {
    pub fn verification_url(&self, token: &str) -> String {
        join_url(&self.frontend_origin, &self.verification_path, token)
    }

    pub fn reset_url(&self, token: &str) -> String {
        join_url(&self.frontend_origin, &self.reset_path, token)
    }
}

fn join_url(origin: &str, path: &str, token: &str) -> String {
    format!(
        "{}/{}{}",
        origin.trim_end_matches('/'),
        path.trim_start_matches('/'),
        token
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: &'static str,
    pub body: String,
}

pub fn render(kind: TokenKind, name: &str, token: &str, links: &EmailLinks) -> RenderedEmail {
    match kind {
        TokenKind::Verification => RenderedEmail {
            subject: "Verify your email",
            body: format!(
                "Hi {},\n\nThanks for signing up! Verify your email here:\n{}\n\nThis link will expire in 24 hours.",
                name,
                links.verification_url(token)
            ),
        },
        TokenKind::Reset => RenderedEmail {
            subject: "Reset your password",
            body: format!(
                "Hi {},\n\nYou requested to reset your password.\n\nReset here:\n{}\n\nThis link will expire in 1 hour. If you did not request this, you can ignore this email.",
                name,
                links.reset_url(token)
            ),
        },
        TokenKind::Otp => RenderedEmail {
            subject: "Your login code",
            body: format!(
                "Hi {},\n\nYour one-time login code is {}.\n\nIt expires in 10 minutes.",
                name, token
            ),
        },
    }
}
