use std::sync::Arc;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::user_repository::{is_unique_violation, UserRepository},
    errors::AuthError,
    models::{
        payloads::{
            validate_email, LoginPayload, RegisterPayload, ResetPasswordPayload, VerifyOtpPayload,
        },
        user::{NewUser, PublicUser, User},
    },
    services::{
        smtp_mailer::Mailer,
        token_issuer::{TokenIssuer, TokenKind},
    },
    utils::{
        clock::Clock,
        email::normalize_email,
        jwt::JwtSettings,
        password::{hash_password, verify_password},
    },
};

/// Wrong guesses allowed against one OTP before it is discarded.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

// Verified against when the email is unknown so both paths cost one argon2 run.
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_password("amora-timing-equalizer").unwrap_or_default());

/// A freshly opened session.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub token: String,
    pub user: PublicUser,
}

/// Account lifecycle workflows: registration, verification, login, password
/// reset and OTP login. Every operation is a single async call that either
/// completes or reports exactly one [`AuthError`].
pub struct AccountService {
    db: Arc<dyn UserRepository>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    tokens: TokenIssuer,
    jwt: Arc<JwtSettings>,
}

impl AccountService {
    pub fn new(
        db: Arc<dyn UserRepository>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        jwt: Arc<JwtSettings>,
    ) -> Self {
        Self {
            tokens: TokenIssuer::new(clock.clone()),
            db,
            mailer,
            clock,
            jwt,
        }
    }

    pub fn jwt(&self) -> &JwtSettings {
        &self.jwt
    }

    /// Creates an unverified account and mails its verification link.
    ///
    /// A delivery failure is reported, but the account stays created so the
    /// user can ask for a new link.
    pub async fn register(&self, payload: &RegisterPayload) -> Result<Uuid, AuthError> {
        const ERR: &str = "Server error during registration";

        payload.validate()?;
        let email = normalize_email(&payload.email);
        let name = payload.name.trim().to_string();

        if self
            .db
            .is_email_taken(&email)
            .await
            .map_err(|e| AuthError::internal(ERR, e))?
        {
            return Err(AuthError::Conflict);
        }

        let password_hash = hash_password(&payload.password)
            .map_err(|e| AuthError::internal(ERR, anyhow!("password hashing failed: {e}")))?;
        let issued = self.tokens.issue(TokenKind::Verification);

        let new_user = NewUser {
            email: email.clone(),
            name: name.clone(),
            password_hash,
            birthdate: payload.birthdate,
            gender: payload.gender,
            verification_token: issued.token.clone(),
            verification_token_expires: issued.expires_at,
            created_at: self.clock.now(),
        };

        let user_id = match self.db.create_user(&new_user).await {
            Ok(id) => id,
            // Lost a race with a concurrent signup for the same address.
            Err(e) if is_unique_violation(&e) => return Err(AuthError::Conflict),
            Err(e) => return Err(AuthError::internal(ERR, e)),
        };
        info!(%user_id, "user registered");

        self.deliver(TokenKind::Verification, &email, &name, &issued.token)
            .await?;
        Ok(user_id)
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken(TokenKind::Verification));
        }

        let consumed = self
            .db
            .consume_verification_token(token, self.clock.now())
            .await
            .map_err(|e| AuthError::internal("Server error during email verification", e))?;

        match consumed {
            Some(user_id) => {
                info!(%user_id, "email verified");
                Ok(())
            }
            None => Err(AuthError::InvalidToken(TokenKind::Verification)),
        }
    }

    /// Checks credentials and opens a session. The password is checked before
    /// the verified flag, so an unverified account only learns it is
    /// unverified after proving the password.
    pub async fn login(&self, payload: &LoginPayload) -> Result<LoginSuccess, AuthError> {
        const ERR: &str = "Server error during login";

        let email = normalize_email(&payload.email);
        let user = self
            .db
            .find_user_by_email(&email)
            .await
            .map_err(|e| AuthError::internal(ERR, e))?;

        let Some(user) = user else {
            let _ = verify_password(&payload.password, &DUMMY_HASH);
            return Err(AuthError::InvalidCredentials);
        };

        let matches = verify_password(&payload.password, &user.password_hash)
            .map_err(|e| AuthError::internal(ERR, anyhow!("stored hash unreadable: {e}")))?;
        if !matches {
            warn!(user_id = %user.id, "login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_verified {
            return Err(AuthError::UnverifiedAccount);
        }

        let session = self.open_session(&user, ERR)?;
        info!(user_id = %user.id, "login succeeded");
        Ok(session)
    }

    /// Replaces any outstanding verification token with a fresh one and mails it.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        const ERR: &str = "Server error during resend verification email";

        let user = self.require_user(email, ERR).await?;
        if user.is_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let issued = self.tokens.issue(TokenKind::Verification);
        self.db
            .set_verification_token(user.id, &issued.token, issued.expires_at)
            .await
            .map_err(|e| AuthError::internal(ERR, e))?;

        self.deliver(TokenKind::Verification, &user.email, &user.name, &issued.token)
            .await
    }

    /// Starts a password reset. Unknown addresses are reported as `NotFound`.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        const ERR: &str = "Server error during password reset request";

        let user = self.require_user(email, ERR).await?;
        let issued = self.tokens.issue(TokenKind::Reset);
        self.db
            .set_password_reset_token(user.id, &issued.token, issued.expires_at)
            .await
            .map_err(|e| AuthError::internal(ERR, e))?;
        info!(user_id = %user.id, "password reset requested");

        self.deliver(TokenKind::Reset, &user.email, &user.name, &issued.token)
            .await
    }

    /// Read-only check; the token stays usable.
    pub async fn verify_reset_token(&self, token: &str) -> Result<bool, AuthError> {
        let found = self
            .db
            .find_user_id_by_reset_token(token.trim(), self.clock.now())
            .await
            .map_err(|e| AuthError::internal("Server error during token verification", e))?;
        Ok(found.is_some())
    }

    /// Sets a new password and burns the reset token in one write.
    pub async fn reset_password(
        &self,
        token: &str,
        payload: &ResetPasswordPayload,
    ) -> Result<(), AuthError> {
        const ERR: &str = "Server error during password reset";

        payload.validate()?;
        let password_hash = hash_password(&payload.password)
            .map_err(|e| AuthError::internal(ERR, anyhow!("password hashing failed: {e}")))?;

        let consumed = self
            .db
            .consume_password_reset_token(token.trim(), &password_hash, self.clock.now())
            .await
            .map_err(|e| AuthError::internal(ERR, e))?;

        match consumed {
            Some(user_id) => {
                info!(%user_id, "password reset");
                Ok(())
            }
            None => Err(AuthError::InvalidToken(TokenKind::Reset)),
        }
    }

    /// Mails a one-time login code. Only verified accounts may use OTP login.
    pub async fn request_otp(&self, email: &str) -> Result<(), AuthError> {
        const ERR: &str = "Server error during OTP request";

        validate_email(email)?;
        let user = self.require_user(email, ERR).await?;
        if !user.is_verified {
            return Err(AuthError::UnverifiedAccount);
        }

        let issued = self.tokens.issue(TokenKind::Otp);
        self.db
            .set_otp(user.id, &issued.token, issued.expires_at)
            .await
            .map_err(|e| AuthError::internal(ERR, e))?;

        self.deliver(TokenKind::Otp, &user.email, &user.name, &issued.token)
            .await
    }

    /// Exchanges a mailed OTP for a session.
    ///
    /// Unknown email, missing code, expired code and wrong code all surface as
    /// the same `InvalidToken(Otp)`.
    pub async fn verify_otp(&self, payload: &VerifyOtpPayload) -> Result<LoginSuccess, AuthError> {
        const ERR: &str = "Server error during OTP verification";
        let invalid = AuthError::InvalidToken(TokenKind::Otp);

        payload.validate()?;
        let email = normalize_email(&payload.email);
        let Some(user) = self
            .db
            .find_user_by_email(&email)
            .await
            .map_err(|e| AuthError::internal(ERR, e))?
        else {
            return Err(invalid);
        };

        let (Some(code), Some(expires)) = (user.otp_code.as_deref(), user.otp_expires) else {
            return Err(invalid);
        };

        if expires <= self.clock.now() || user.otp_attempts >= MAX_OTP_ATTEMPTS {
            self.db
                .clear_otp(user.id)
                .await
                .map_err(|e| AuthError::internal(ERR, e))?;
            return Err(invalid);
        }

        let supplied = payload.otp.trim();
        if !bool::from(code.as_bytes().ct_eq(supplied.as_bytes())) {
            let attempts = self
                .db
                .record_failed_otp_attempt(user.id)
                .await
                .map_err(|e| AuthError::internal(ERR, e))?;
            if attempts >= MAX_OTP_ATTEMPTS {
                warn!(user_id = %user.id, attempts, "OTP discarded after too many attempts");
                self.db
                    .clear_otp(user.id)
                    .await
                    .map_err(|e| AuthError::internal(ERR, e))?;
            }
            return Err(invalid);
        }

        self.db
            .clear_otp(user.id)
            .await
            .map_err(|e| AuthError::internal(ERR, e))?;

        let session = self.open_session(&user, ERR)?;
        info!(user_id = %user.id, "OTP login succeeded");
        Ok(session)
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<PublicUser, AuthError> {
        self.db
            .find_user_by_id(user_id)
            .await
            .map_err(|e| AuthError::internal("Server error while loading user", e))?
            .map(|user| user.to_public())
            .ok_or(AuthError::NotFound)
    }

    async fn require_user(&self, email: &str, err: &'static str) -> Result<User, AuthError> {
        self.db
            .find_user_by_email(&normalize_email(email))
            .await
            .map_err(|e| AuthError::internal(err, e))?
            .ok_or(AuthError::NotFound)
    }

    fn open_session(&self, user: &User, err: &'static str) -> Result<LoginSuccess, AuthError> {
        let token = self
            .jwt
            .sign_session(user.id, self.clock.now())
            .map_err(|e| AuthError::internal(err, e))?;
        Ok(LoginSuccess {
            token,
            user: user.to_public(),
        })
    }

    async fn deliver(
        &self,
        kind: TokenKind,
        to: &str,
        name: &str,
        token: &str,
    ) -> Result<(), AuthError> {
        self.mailer.send(kind, to, name, token).await.map_err(|e| {
            warn!(%kind, error = %e, "failed to send account email");
            AuthError::Delivery(kind)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::memory_user_repository::InMemoryUserRepository,
        models::user::Gender,
        services::smtp_mailer::MockMailer,
        utils::{clock::MockClock, jwt::JwtKeys},
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use time::{Duration, OffsetDateTime};

    struct Harness {
        service: AccountService,
        repo: Arc<InMemoryUserRepository>,
        mailer: Arc<MockMailer>,
        clock: Arc<MockClock>,
    }

    fn jwt_settings() -> Arc<JwtSettings> {
        Arc::new(JwtSettings {
            keys: JwtKeys::from_secret("0123456789abcdef0123456789abcdef").unwrap(),
            issuer: "amora".into(),
            audience: "amora-app".into(),
        })
    }

    fn harness() -> Harness {
        let repo = Arc::new(InMemoryUserRepository::new());
        let mailer = Arc::new(MockMailer::default());
        let clock = Arc::new(MockClock::new(OffsetDateTime::now_utc()));
        let service = AccountService::new(
            repo.clone(),
            mailer.clone(),
            clock.clone(),
            jwt_settings(),
        );
        Harness {
            service,
            repo,
            mailer,
            clock,
        }
    }

    fn register_payload(email: &str, password: &str) -> RegisterPayload {
        RegisterPayload {
            name: "Alice".into(),
            email: email.into(),
            password: password.into(),
            confirm_password: password.into(),
            birthdate: NaiveDate::from_ymd_opt(1995, 4, 12).unwrap(),
            gender: Gender::Female,
        }
    }

    fn login_payload(email: &str, password: &str) -> LoginPayload {
        LoginPayload {
            email: email.into(),
            password: password.into(),
        }
    }

    fn reset_payload(password: &str, confirm: &str) -> ResetPasswordPayload {
        ResetPasswordPayload {
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    fn otp_payload(email: &str, otp: &str) -> VerifyOtpPayload {
        VerifyOtpPayload {
            email: email.into(),
            otp: otp.into(),
        }
    }

    async fn verified_user(h: &Harness, email: &str, password: &str) -> Uuid {
        let id = h
            .service
            .register(&register_payload(email, password))
            .await
            .unwrap();
        let token = h.mailer.last_token(TokenKind::Verification).unwrap();
        h.service.verify_email(&token).await.unwrap();
        id
    }

    fn wrong_otp(code: &str) -> String {
        if code == "0000" {
            "1111".into()
        } else {
            "0000".into()
        }
    }

    #[tokio::test]
    async fn register_creates_unverified_user_and_mails_token() {
        let h = harness();
        let id = h
            .service
            .register(&register_payload(" a@x.com ", "pw1"))
            .await
            .unwrap();

        let user = h.repo.get(id).unwrap();
        assert_eq!(user.email, "a@x.com");
        assert!(!user.is_verified);
        assert_ne!(user.password_hash, "pw1");
        assert_eq!(
            user.verification_token_expires,
            Some(h.clock.now() + Duration::hours(24))
        );

        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, TokenKind::Verification);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(Some(sent[0].token.clone()), user.verification_token);
    }

    #[tokio::test]
    async fn register_stamps_created_at_from_the_clock() {
        let h = harness();
        h.clock.advance(Duration::days(3));
        let id = h
            .service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap();

        assert_eq!(h.repo.get(id).unwrap().created_at, h.clock.now());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let h = harness();
        h.service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap();

        let err = h
            .service
            .register(&register_payload("a@x.com", "pw2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
        assert_eq!(h.repo.len(), 1);
    }

    #[tokio::test]
    async fn register_rejects_mismatched_passwords_without_writing() {
        let h = harness();
        let mut payload = register_payload("a@x.com", "pw1");
        payload.confirm_password = "pw2".into();

        let err = h.service.register(&payload).await.unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(h.repo.is_empty());
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn register_reports_delivery_failure_but_keeps_account() {
        let h = harness();
        h.mailer.set_failing(true);

        let err = h
            .service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Delivery(TokenKind::Verification)));
        assert!(h.repo.get_by_email("a@x.com").is_some());
    }

    #[tokio::test]
    async fn verify_email_is_single_use() {
        let h = harness();
        let id = h
            .service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap();
        let token = h.mailer.last_token(TokenKind::Verification).unwrap();

        h.service.verify_email(&token).await.unwrap();
        let user = h.repo.get(id).unwrap();
        assert!(user.is_verified);
        assert!(user.verification_token.is_none());

        let err = h.service.verify_email(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Verification)));
    }

    #[tokio::test]
    async fn verify_email_rejects_expired_token() {
        let h = harness();
        let id = h
            .service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap();
        let token = h.mailer.last_token(TokenKind::Verification).unwrap();

        h.clock.advance(Duration::hours(24) + Duration::seconds(1));
        let err = h.service.verify_email(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Verification)));
        assert!(!h.repo.get(id).unwrap().is_verified);
    }

    #[tokio::test]
    async fn verify_email_rejects_blank_token() {
        let h = harness();
        let err = h.service.verify_email("  ").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Verification)));
    }

    #[tokio::test]
    async fn login_before_verification_is_refused() {
        let h = harness();
        h.service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap();

        let err = h
            .service
            .login(&login_payload("a@x.com", "pw1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnverifiedAccount));
    }

    #[tokio::test]
    async fn login_checks_password_before_verified_flag() {
        let h = harness();
        h.service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap();

        let err = h
            .service
            .login(&login_payload("a@x.com", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_does_not_reveal_which_field_was_wrong() {
        let h = harness();
        verified_user(&h, "a@x.com", "pw1").await;

        let unknown = h
            .service
            .login(&login_payload("b@x.com", "pw1"))
            .await
            .unwrap_err();
        let wrong = h
            .service
            .login(&login_payload("a@x.com", "pw2"))
            .await
            .unwrap_err();

        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(unknown.status(), wrong.status());
    }

    #[tokio::test]
    async fn login_is_case_sensitive_on_email() {
        let h = harness();
        verified_user(&h, "a@x.com", "pw1").await;

        let err = h
            .service
            .login(&login_payload("A@x.com", "pw1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_issues_session_for_the_user() {
        let h = harness();
        let id = verified_user(&h, "a@x.com", "pw1").await;

        let session = h
            .service
            .login(&login_payload("a@x.com", "pw1"))
            .await
            .unwrap();
        assert_eq!(session.user.id, id);
        assert_eq!(session.user.email, "a@x.com");

        let claims = h.service.jwt().verify_session(&session.token).unwrap();
        assert_eq!(claims.id, id.to_string());
        assert_eq!(
            claims.exp as i64 - claims.iat as i64,
            Duration::days(30).whole_seconds()
        );
    }

    #[tokio::test]
    async fn resend_replaces_the_previous_token() {
        let h = harness();
        h.service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap();
        let first = h.mailer.last_token(TokenKind::Verification).unwrap();

        h.service.resend_verification("a@x.com").await.unwrap();
        let second = h.mailer.last_token(TokenKind::Verification).unwrap();
        assert_ne!(first, second);

        let err = h.service.verify_email(&first).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
        h.service.verify_email(&second).await.unwrap();
    }

    #[tokio::test]
    async fn resend_for_verified_or_unknown_account_fails() {
        let h = harness();
        verified_user(&h, "a@x.com", "pw1").await;

        assert!(matches!(
            h.service.resend_verification("a@x.com").await,
            Err(AuthError::AlreadyVerified)
        ));
        assert!(matches!(
            h.service.resend_verification("nobody@x.com").await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_is_not_found() {
        let h = harness();
        let err = h.service.forgot_password("nobody@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn reset_flow_changes_password_once() {
        let h = harness();
        verified_user(&h, "a@x.com", "old").await;

        h.service.forgot_password("a@x.com").await.unwrap();
        let token = h.mailer.last_token(TokenKind::Reset).unwrap();
        assert!(h.service.verify_reset_token(&token).await.unwrap());
        // Checking does not consume the token.
        assert!(h.service.verify_reset_token(&token).await.unwrap());

        h.service
            .reset_password(&token, &reset_payload("new", "new"))
            .await
            .unwrap();

        assert!(!h.service.verify_reset_token(&token).await.unwrap());
        let err = h
            .service
            .reset_password(&token, &reset_payload("newer", "newer"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Reset)));

        assert!(h
            .service
            .login(&login_payload("a@x.com", "new"))
            .await
            .is_ok());
        assert!(matches!(
            h.service.login(&login_payload("a@x.com", "old")).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn repeated_forgot_password_invalidates_previous_reset_token() {
        let h = harness();
        verified_user(&h, "a@x.com", "old").await;

        h.service.forgot_password("a@x.com").await.unwrap();
        let first = h.mailer.last_token(TokenKind::Reset).unwrap();
        h.service.forgot_password("a@x.com").await.unwrap();
        let second = h.mailer.last_token(TokenKind::Reset).unwrap();
        assert_ne!(first, second);

        assert!(!h.service.verify_reset_token(&first).await.unwrap());
        let err = h
            .service
            .reset_password(&first, &reset_payload("new", "new"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Reset)));

        assert!(h.service.verify_reset_token(&second).await.unwrap());
        h.service
            .reset_password(&second, &reset_payload("new", "new"))
            .await
            .unwrap();
        assert!(h
            .service
            .login(&login_payload("a@x.com", "new"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn reset_with_mismatched_passwords_changes_nothing() {
        let h = harness();
        let id = verified_user(&h, "a@x.com", "old").await;
        h.service.forgot_password("a@x.com").await.unwrap();
        let token = h.mailer.last_token(TokenKind::Reset).unwrap();
        let before = h.repo.get(id).unwrap();

        let err = h
            .service
            .reset_password(&token, &reset_payload("new", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let after = h.repo.get(id).unwrap();
        assert_eq!(before.password_hash, after.password_hash);
        assert_eq!(after.reset_password_token, Some(token.clone()));
        assert!(h.service.verify_reset_token(&token).await.unwrap());
    }

    #[tokio::test]
    async fn reset_token_expires_after_an_hour() {
        let h = harness();
        verified_user(&h, "a@x.com", "old").await;
        h.service.forgot_password("a@x.com").await.unwrap();
        let token = h.mailer.last_token(TokenKind::Reset).unwrap();

        h.clock.advance(Duration::minutes(59));
        assert!(h.service.verify_reset_token(&token).await.unwrap());
        h.clock.advance(Duration::minutes(1));
        assert!(!h.service.verify_reset_token(&token).await.unwrap());

        let err = h
            .service
            .reset_password(&token, &reset_payload("new", "new"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Reset)));
    }

    #[tokio::test]
    async fn otp_login_round_trip() {
        let h = harness();
        let id = verified_user(&h, "a@x.com", "pw1").await;

        h.service.request_otp("a@x.com").await.unwrap();
        let code = h.mailer.last_token(TokenKind::Otp).unwrap();

        let session = h
            .service
            .verify_otp(&otp_payload("a@x.com", &code))
            .await
            .unwrap();
        assert_eq!(session.user.id, id);
        assert!(h.repo.get(id).unwrap().otp_code.is_none());

        let err = h
            .service
            .verify_otp(&otp_payload("a@x.com", &code))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Otp)));
    }

    #[tokio::test]
    async fn otp_requires_verified_account() {
        let h = harness();
        h.service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap();

        assert!(matches!(
            h.service.request_otp("a@x.com").await,
            Err(AuthError::UnverifiedAccount)
        ));
        assert!(matches!(
            h.service.request_otp("nobody@x.com").await,
            Err(AuthError::NotFound)
        ));
        assert!(matches!(
            h.service.request_otp("not-an-email").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn otp_expires_after_ten_minutes() {
        let h = harness();
        verified_user(&h, "a@x.com", "pw1").await;
        h.service.request_otp("a@x.com").await.unwrap();
        let code = h.mailer.last_token(TokenKind::Otp).unwrap();

        h.clock.advance(Duration::minutes(10));
        let err = h
            .service
            .verify_otp(&otp_payload("a@x.com", &code))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Otp)));
    }

    #[tokio::test]
    async fn otp_is_discarded_after_too_many_wrong_guesses() {
        let h = harness();
        let id = verified_user(&h, "a@x.com", "pw1").await;
        h.service.request_otp("a@x.com").await.unwrap();
        let code = h.mailer.last_token(TokenKind::Otp).unwrap();
        let wrong = wrong_otp(&code);

        for _ in 0..MAX_OTP_ATTEMPTS {
            let err = h
                .service
                .verify_otp(&otp_payload("a@x.com", &wrong))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidToken(TokenKind::Otp)));
        }
        assert!(h.repo.get(id).unwrap().otp_code.is_none());

        let err = h
            .service
            .verify_otp(&otp_payload("a@x.com", &code))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Otp)));
    }

    #[tokio::test]
    async fn otp_for_unknown_email_looks_like_a_wrong_code() {
        let h = harness();
        let err = h
            .service
            .verify_otp(&otp_payload("nobody@x.com", "1234"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(TokenKind::Otp)));
    }

    #[tokio::test]
    async fn current_user_returns_public_view() {
        let h = harness();
        let id = verified_user(&h, "a@x.com", "pw1").await;

        let user = h.service.current_user(id).await.unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.gender, Gender::Female);

        assert!(matches!(
            h.service.current_user(Uuid::new_v4()).await,
            Err(AuthError::NotFound)
        ));
    }

    struct BrokenRepository;

    #[async_trait]
    impl UserRepository for BrokenRepository {
        async fn find_user_by_email(&self, _: &str) -> Result<Option<User>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn find_user_by_id(&self, _: Uuid) -> Result<Option<User>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn is_email_taken(&self, _: &str) -> Result<bool, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn create_user(&self, _: &NewUser) -> Result<Uuid, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn consume_verification_token(
            &self,
            _: &str,
            _: OffsetDateTime,
        ) -> Result<Option<Uuid>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn set_verification_token(
            &self,
            _: Uuid,
            _: &str,
            _: OffsetDateTime,
        ) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn set_password_reset_token(
            &self,
            _: Uuid,
            _: &str,
            _: OffsetDateTime,
        ) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn find_user_id_by_reset_token(
            &self,
            _: &str,
            _: OffsetDateTime,
        ) -> Result<Option<Uuid>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn consume_password_reset_token(
            &self,
            _: &str,
            _: &str,
            _: OffsetDateTime,
        ) -> Result<Option<Uuid>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn set_otp(&self, _: Uuid, _: &str, _: OffsetDateTime) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn record_failed_otp_attempt(&self, _: Uuid) -> Result<i32, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
        async fn clear_otp(&self, _: Uuid) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
    }

    #[tokio::test]
    async fn storage_failures_surface_as_internal_errors() {
        let service = AccountService::new(
            Arc::new(BrokenRepository),
            Arc::new(MockMailer::default()),
            Arc::new(MockClock::default()),
            jwt_settings(),
        );

        let err = service
            .register(&register_payload("a@x.com", "pw1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Server error during registration");
        assert_eq!(err.code(), "internal_error");

        let err = service
            .login(&login_payload("a@x.com", "pw1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Server error during login");

        let err = service.verify_email("abc").await.unwrap_err();
        assert!(matches!(err, AuthError::Internal { .. }));
    }
}
