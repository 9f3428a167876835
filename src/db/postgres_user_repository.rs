//! Postgres-backed credential store.
//!
//! Expects a `users` table with a unique index on `email`, a `gender` enum type
//! (`male`, `female`, `other`), and the token columns mirrored by
//! [`crate::models::user::User`]. Tokens live on the user row, so issuing a new
//! one overwrites the previous.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::user_repository::UserRepository,
    models::user::{NewUser, User},
};

pub struct PostgresUserRepository {
    pub pool: PgPool,
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id,
                   email,
                   name,
                   password_hash,
                   birthdate,
                   gender,
                   is_verified,
                   verification_token,
                   verification_token_expires,
                   reset_password_token,
                   reset_password_expires,
                   otp_code,
                   otp_expires,
                   otp_attempts,
                   created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id,
                   email,
                   name,
                   password_hash,
                   birthdate,
                   gender,
                   is_verified,
                   verification_token,
                   verification_token_expires,
                   reset_password_token,
                   reset_password_expires,
                   otp_code,
                   otp_expires,
                   otp_attempts,
                   created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn is_email_taken(&self, email: &str) -> Result<bool, sqlx::Error> {
        let res = sqlx::query_scalar::<_, i32>("SELECT 1 FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(res.is_some())
    }

    async fn create_user(&self, user: &NewUser) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (
                id, email, name, password_hash, birthdate, gender, is_verified,
                verification_token, verification_token_expires, otp_attempts, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, false, $7, $8, 0, $9)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.birthdate)
        .bind(user.gender)
        .bind(&user.verification_token)
        .bind(user.verification_token_expires)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn consume_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
            SET is_verified = true,
                verification_token = NULL,
                verification_token_expires = NULL
            WHERE verification_token = $1
              AND verification_token_expires > $2
            RETURNING id
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET verification_token = $1, verification_token_expires = $2 WHERE id = $3",
        )
        .bind(token)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET reset_password_token = $1, reset_password_expires = $2 WHERE id = $3",
        )
        .bind(token)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user_id_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM users
            WHERE reset_password_token = $1 AND reset_password_expires > $2
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    async fn consume_password_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
            SET password_hash = $1,
                reset_password_token = NULL,
                reset_password_expires = NULL
            WHERE reset_password_token = $2
              AND reset_password_expires > $3
            RETURNING id
            "#,
        )
        .bind(password_hash)
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_otp(
        &self,
        user_id: Uuid,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET otp_code = $1, otp_expires = $2, otp_attempts = 0 WHERE id = $3",
        )
        .bind(code)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failed_otp_attempt(&self, user_id: Uuid) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE users SET otp_attempts = otp_attempts + 1 WHERE id = $1 RETURNING otp_attempts",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn clear_otp(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET otp_code = NULL, otp_expires = NULL, otp_attempts = 0 WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
