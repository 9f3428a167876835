use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::user::{NewUser, User};

/// Credential store.
///
/// Token lookups take `now` and must only match rows whose expiry is strictly
/// after it, so an expired token is never a candidate. Each method is a single
/// atomic write or read.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;
    async fn is_email_taken(&self, email: &str) -> Result<bool, sqlx::Error>;
    /// Fails with a unique-violation database error if the email already exists.
    async fn create_user(&self, user: &NewUser) -> Result<Uuid, sqlx::Error>;

    /// Marks the owner of `token` verified and clears the token. `None` if no
    /// unexpired match.
    async fn consume_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error>;
    /// Overwrites any outstanding verification token.
    async fn set_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;

    /// Overwrites any outstanding reset token.
    async fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;
    async fn find_user_id_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error>;
    /// Replaces the password hash of the owner of `token` and clears the token.
    async fn consume_password_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error>;

    /// Stores a fresh OTP and resets the failed-attempt counter.
    async fn set_otp(
        &self,
        user_id: Uuid,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;
    /// Returns the attempt count after incrementing.
    async fn record_failed_otp_attempt(&self, user_id: Uuid) -> Result<i32, sqlx::Error>;
    async fn clear_otp(&self, user_id: Uuid) -> Result<(), sqlx::Error>;
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
