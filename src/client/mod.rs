//! Typed client for the account API.
//!
//! Mirrors the `/api` routes one method per operation. The session obtained by
//! [`AuthClient::login`] or [`AuthClient::verify_otp`] is kept in an explicit
//! [`SessionStore`] rather than in ambient global state.

mod session_store;

pub use session_store::{
    FileSessionStore, MemorySessionStore, Session, SessionStore, SessionStoreError,
};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use thiserror::Error;

use crate::models::{
    payloads::{
        LoginPayload, LoginResponse, MeResponse, RegisterPayload, RegisterResponse,
        ResetPasswordPayload, VerifyOtpPayload, VerifyOtpResponse,
    },
    user::PublicUser,
};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Api { status: StatusCode, message: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] SessionStoreError),
    #[error("Not logged in")]
    NotAuthenticated,
}

#[derive(Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub struct AuthClient<S: SessionStore> {
    http: Client,
    base_url: String,
    store: S,
}

impl<S: SessionStore> AuthClient<S> {
    /// `base_url` includes the `/api` prefix, e.g. `http://localhost:5000/api`.
    pub fn new(base_url: impl Into<String>, store: S) -> Self {
        Self::with_client(Client::new(), base_url, store)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, store: S) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn register(
        &self,
        payload: &RegisterPayload,
    ) -> Result<RegisterResponse, ClientError> {
        let req = self.http.post(self.url("/register")).json(payload);
        self.send(req, "Registration failed").await
    }

    pub async fn verify_email(&self, token: &str) -> Result<String, ClientError> {
        let path = format!("/verify/{}", urlencoding::encode(token));
        let req = self.http.get(self.url(&path));
        self.send_message(req, "Email verification failed").await
    }

    /// Logs in and stores the resulting session.
    pub async fn login(&self, payload: &LoginPayload) -> Result<Session, ClientError> {
        let req = self.http.post(self.url("/login")).json(payload);
        let body: LoginResponse = self.send(req, "Login failed").await?;
        self.remember(body.token, body.user)
    }

    pub async fn resend_verification(&self, email: &str) -> Result<String, ClientError> {
        let req = self
            .http
            .post(self.url("/resend-verification"))
            .json(&json!({ "email": email }));
        self.send_message(req, "Failed to resend verification email")
            .await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<String, ClientError> {
        let req = self
            .http
            .post(self.url("/forgot-password"))
            .json(&json!({ "email": email }));
        self.send_message(req, "Failed to send password reset email")
            .await
    }

    pub async fn verify_reset_token(&self, token: &str) -> Result<String, ClientError> {
        let path = format!("/reset-password/{}/verify", urlencoding::encode(token));
        let req = self.http.get(self.url(&path));
        self.send_message(req, "Invalid or expired token").await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        payload: &ResetPasswordPayload,
    ) -> Result<String, ClientError> {
        let path = format!("/reset-password/{}", urlencoding::encode(token));
        let req = self.http.post(self.url(&path)).json(payload);
        self.send_message(req, "Failed to reset password").await
    }

    pub async fn request_otp(&self, email: &str) -> Result<String, ClientError> {
        let req = self
            .http
            .post(self.url("/request-otp"))
            .json(&json!({ "email": email }));
        self.send_message(req, "Failed to send OTP").await
    }

    /// Exchanges an emailed code for a session and stores it.
    pub async fn verify_otp(&self, payload: &VerifyOtpPayload) -> Result<Session, ClientError> {
        let req = self.http.post(self.url("/verify-otp")).json(payload);
        let body: VerifyOtpResponse = self.send(req, "Invalid OTP").await?;
        self.remember(body.token, body.user)
    }

    /// Fetches the stored session's user from the server.
    pub async fn me(&self) -> Result<PublicUser, ClientError> {
        let token = self.token()?.ok_or(ClientError::NotAuthenticated)?;
        let req = self.http.get(self.url("/me")).bearer_auth(token);
        let body: MeResponse = self.send(req, "Failed to load user").await?;
        Ok(body.user)
    }

    pub fn logout(&self) -> Result<(), ClientError> {
        self.store.clear()?;
        Ok(())
    }

    /// Presence check only; the token is not validated.
    pub fn is_authenticated(&self) -> Result<bool, ClientError> {
        Ok(self.token()?.is_some())
    }

    pub fn current_user(&self) -> Result<Option<PublicUser>, ClientError> {
        Ok(self.store.load()?.map(|session| session.user))
    }

    pub fn token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.store.load()?.map(|session| session.token))
    }

    fn remember(&self, token: String, user: PublicUser) -> Result<Session, ClientError> {
        let session = Session { token, user };
        self.store.save(&session)?;
        Ok(session)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_message(
        &self,
        req: RequestBuilder,
        fallback: &str,
    ) -> Result<String, ClientError> {
        let body: MessageBody = self.send(req, fallback).await?;
        Ok(body.message)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        fallback: &str,
    ) -> Result<T, ClientError> {
        let res = req.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res.json::<T>().await?);
        }

        let message = res
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| fallback.to_string());
        Err(ClientError::Api { status, message })
    }
}
