use std::{borrow::Cow, error::Error as StdError, fmt};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use sqlx::error::{DatabaseError, ErrorKind};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::user_repository::UserRepository,
    models::user::{NewUser, User},
};

/// Process-local credential store. Used when no `DATABASE_URL` is configured
/// and as the backing store in tests.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: DashMap<Uuid, User>,
    emails: DashMap<String, Uuid>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored record.
    pub fn get(&self, user_id: Uuid) -> Option<User> {
        self.users.get(&user_id).map(|user| user.clone())
    }

    pub fn get_by_email(&self, email: &str) -> Option<User> {
        let id = *self.emails.get(email)?;
        self.get(id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn update<F>(&self, user_id: Uuid, f: F) -> Result<(), sqlx::Error>
    where
        F: FnOnce(&mut User),
    {
        let mut user = self.users.get_mut(&user_id).ok_or(sqlx::Error::RowNotFound)?;
        f(user.value_mut());
        Ok(())
    }

    /// Applies `f` to the first user matching `pred`, all under that entry's lock.
    fn update_first<P, F>(&self, pred: P, f: F) -> Option<Uuid>
    where
        P: Fn(&User) -> bool,
        F: FnOnce(&mut User),
    {
        let mut entry = self.users.iter_mut().find(|entry| pred(entry.value()))?;
        f(entry.value_mut());
        Some(*entry.key())
    }
}

fn token_matches(
    stored: &Option<String>,
    expires: &Option<OffsetDateTime>,
    token: &str,
    now: OffsetDateTime,
) -> bool {
    match (stored, expires) {
        (Some(stored), Some(expires)) => stored == token && *expires > now,
        _ => false,
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        Ok(self.get_by_email(email))
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.get(user_id))
    }

    async fn is_email_taken(&self, email: &str) -> Result<bool, sqlx::Error> {
        Ok(self.emails.contains_key(email))
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();
        match self.emails.entry(new_user.email.clone()) {
            Entry::Occupied(_) => {
                return Err(sqlx::Error::Database(Box::new(DuplicateEmail)));
            }
            Entry::Vacant(slot) => {
                self.users.insert(
                    id,
                    User {
                        id,
                        email: new_user.email.clone(),
                        name: new_user.name.clone(),
                        password_hash: new_user.password_hash.clone(),
                        birthdate: new_user.birthdate,
                        gender: new_user.gender,
                        is_verified: false,
                        verification_token: Some(new_user.verification_token.clone()),
                        verification_token_expires: Some(new_user.verification_token_expires),
                        reset_password_token: None,
                        reset_password_expires: None,
                        otp_code: None,
                        otp_expires: None,
                        otp_attempts: 0,
                        created_at: new_user.created_at,
                    },
                );
                slot.insert(id);
            }
        }
        Ok(id)
    }

    async fn consume_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        Ok(self.update_first(
            |user| {
                token_matches(
                    &user.verification_token,
                    &user.verification_token_expires,
                    token,
                    now,
                )
            },
            |user| {
                user.is_verified = true;
                user.verification_token = None;
                user.verification_token_expires = None;
            },
        ))
    }

    async fn set_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.update(user_id, |user| {
            user.verification_token = Some(token.to_string());
            user.verification_token_expires = Some(expires_at);
        })
    }

    async fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.update(user_id, |user| {
            user.reset_password_token = Some(token.to_string());
            user.reset_password_expires = Some(expires_at);
        })
    }

    async fn find_user_id_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        Ok(self
            .users
            .iter()
            .find(|entry| {
                token_matches(
                    &entry.reset_password_token,
                    &entry.reset_password_expires,
                    token,
                    now,
                )
            })
            .map(|entry| *entry.key()))
    }

    async fn consume_password_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        Ok(self.update_first(
            |user| {
                token_matches(
                    &user.reset_password_token,
                    &user.reset_password_expires,
                    token,
                    now,
                )
            },
            |user| {
                user.password_hash = password_hash.to_string();
                user.reset_password_token = None;
                user.reset_password_expires = None;
            },
        ))
    }

    async fn set_otp(
        &self,
        user_id: Uuid,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.update(user_id, |user| {
            user.otp_code = Some(code.to_string());
            user.otp_expires = Some(expires_at);
            user.otp_attempts = 0;
        })
    }

    async fn record_failed_otp_attempt(&self, user_id: Uuid) -> Result<i32, sqlx::Error> {
        let mut attempts = 0;
        self.update(user_id, |user| {
            user.otp_attempts += 1;
            attempts = user.otp_attempts;
        })?;
        Ok(attempts)
    }

    async fn clear_otp(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        self.update(user_id, |user| {
            user.otp_code = None;
            user.otp_expires = None;
            user.otp_attempts = 0;
        })
    }
}

/// Unique-violation error so callers treat in-memory and Postgres conflicts alike.
#[derive(Debug)]
struct DuplicateEmail;

impl fmt::Display for DuplicateEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("duplicate key value violates unique constraint \"users_email_key\"")
    }
}

impl StdError for DuplicateEmail {}

impl DatabaseError for DuplicateEmail {
    fn message(&self) -> &str {
        "duplicate key value violates unique constraint \"users_email_key\""
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed("23505"))
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::UniqueViolation
    }
}
