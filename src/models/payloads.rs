//! Request and response bodies for the `/api` surface, shared by the server
//! handlers and the client SDK.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    errors::AuthError,
    models::user::{Gender, PublicUser},
    services::token_issuer::OTP_DIGITS,
    utils::email::{normalize_email, valid_email},
};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    pub birthdate: NaiveDate,
    pub gender: Gender,
}

impl RegisterPayload {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.password != self.confirm_password {
            return Err(AuthError::validation("Passwords do not match"));
        }
        if self.password.is_empty() {
            return Err(AuthError::validation("Password is required"));
        }
        if self.name.trim().is_empty() {
            return Err(AuthError::validation("Name is required"));
        }
        validate_email(&self.email)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

/// Body of every endpoint that only needs an address: resend, forgot, request OTP.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailPayload {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordPayload {
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl ResetPasswordPayload {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.password != self.confirm_password {
            return Err(AuthError::validation("Passwords do not match"));
        }
        if self.password.is_empty() {
            return Err(AuthError::validation("Password is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyOtpPayload {
    pub email: String,
    pub otp: String,
}

impl VerifyOtpPayload {
    pub fn validate(&self) -> Result<(), AuthError> {
        let otp = self.otp.trim();
        if otp.len() != OTP_DIGITS || !otp.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthError::validation(format!(
                "Please enter complete {}-digit OTP",
                OTP_DIGITS
            )));
        }
        Ok(())
    }
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if valid_email(&normalize_email(email)) {
        Ok(())
    } else {
        Err(AuthError::validation("Please provide a valid email address"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyOtpResponse {
    pub success: bool,
    pub verified: bool,
    pub message: String,
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeResponse {
    pub success: bool,
    pub user: PublicUser,
}
