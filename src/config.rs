use std::{env, net::SocketAddr};

use thiserror::Error;

use crate::{
    services::smtp_mailer::EmailLinks,
    utils::jwt::{JwtKeys, JwtSecretError, JwtSettings},
};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_JWT_ISSUER: &str = "amora";
pub const DEFAULT_JWT_AUDIENCE: &str = "amora-app";
pub const DEFAULT_EMAIL_VERIFICATION_PATH: &str = "/verify-email/";
pub const DEFAULT_RESET_PASSWORD_PATH: &str = "/reset-password/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    JwtSecret(#[from] JwtSecretError),
}

/// Limits for the account routes: one request replenished every `per_seconds`,
/// with up to `burst` requests allowed at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub per_seconds: u64,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_seconds: 1,
            burst: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the server against the in-memory store.
    pub database_url: Option<String>,
    pub frontend_origin: String,
    pub bind_addr: SocketAddr,
    pub jwt: JwtSettings,
    pub email_links: EmailLinks,
    pub auth_rate_limit: RateLimitSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = optional("DATABASE_URL");
        let frontend_origin =
            optional("FRONTEND_ORIGIN").ok_or(ConfigError::Missing("FRONTEND_ORIGIN"))?;

        let bind_addr = optional("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let jwt = JwtSettings {
            keys: JwtKeys::from_env()?,
            issuer: optional("JWT_ISSUER").unwrap_or_else(|| DEFAULT_JWT_ISSUER.to_string()),
            audience: optional("JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_JWT_AUDIENCE.to_string()),
        };

        let email_links = EmailLinks {
            frontend_origin: frontend_origin.clone(),
            verification_path: optional("EMAIL_VERIFICATION_PATH")
                .unwrap_or_else(|| DEFAULT_EMAIL_VERIFICATION_PATH.to_string()),
            reset_path: optional("RESET_PASSWORD_PATH")
                .unwrap_or_else(|| DEFAULT_RESET_PASSWORD_PATH.to_string()),
        };

        let defaults = RateLimitSettings::default();
        let auth_rate_limit = RateLimitSettings {
            per_seconds: parse_or("RATE_LIMITER_AUTH_SECONDS", defaults.per_seconds)?,
            burst: parse_or("RATE_LIMITER_AUTH_BURST", defaults.burst)?,
        };
        if auth_rate_limit.per_seconds == 0 || auth_rate_limit.burst == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMITER_AUTH_SECONDS",
                reason: "rate limiter period and burst must be positive".into(),
            });
        }

        Ok(Config {
            database_url,
            frontend_origin,
            bind_addr,
            jwt,
            email_links,
            auth_rate_limit,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}
