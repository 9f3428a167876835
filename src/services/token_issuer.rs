use std::{fmt, sync::Arc};

use rand::Rng;
use time::{Duration, OffsetDateTime};

use crate::utils::clock::Clock;

/// Bytes of entropy in verification and reset tokens (hex encoded on the wire).
pub const TOKEN_BYTES: usize = 32;
pub const OTP_DIGITS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Verification,
    Reset,
    Otp,
}

impl TokenKind {
    pub fn ttl(self) -> Duration {
        match self {
            TokenKind::Verification => Duration::hours(24),
            TokenKind::Reset => Duration::hours(1),
            TokenKind::Otp => Duration::minutes(10),
        }
    }

    pub fn invalid_message(self) -> &'static str {
        match self {
            TokenKind::Verification => "Invalid or expired verification token",
            TokenKind::Reset => "Invalid or expired reset token",
            TokenKind::Otp => "Invalid or expired OTP",
        }
    }

    pub fn delivery_failure_message(self) -> &'static str {
        match self {
            TokenKind::Verification => "Failed to send verification email",
            TokenKind::Reset => "Failed to send password reset email",
            TokenKind::Otp => "Failed to send OTP",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Verification => "verification",
            TokenKind::Reset => "reset",
            TokenKind::Otp => "otp",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Mints opaque tokens and their expiry. Has no state beyond the clock.
#[derive(Clone)]
pub struct TokenIssuer {
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn issue(&self, kind: TokenKind) -> IssuedToken {
        let token = match kind {
            TokenKind::Verification | TokenKind::Reset => random_token(),
            TokenKind::Otp => random_otp(),
        };

        IssuedToken {
            token,
            expires_at: self.clock.now() + kind.ttl(),
        }
    }
}

fn random_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

fn random_otp() -> String {
    let code: u32 = rand::rng().random_range(0..10u32.pow(OTP_DIGITS as u32));
    format!("{:0width$}", code, width = OTP_DIGITS)
}
