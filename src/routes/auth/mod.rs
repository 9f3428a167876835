pub mod claims;
pub mod forgot_password;
pub mod login;
pub mod otp;
pub mod register;
pub mod resend_verification;
pub mod reset_password;
pub mod session;
pub mod verify;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub use forgot_password::handle_forgot_password;
pub use login::{handle_login, handle_me};
pub use otp::{handle_request_otp, handle_verify_otp};
pub use register::handle_register;
pub use resend_verification::handle_resend_verification;
pub use reset_password::{handle_reset_password, handle_verify_reset_token};
pub use verify::verify_email;

/// Account routes, meant to be nested under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(handle_register))
        .route("/verify/{token}", get(verify_email))
        .route("/login", post(handle_login))
        .route("/resend-verification", post(handle_resend_verification))
        .route("/forgot-password", post(handle_forgot_password))
        .route(
            "/reset-password/{token}/verify",
            get(handle_verify_reset_token),
        )
        .route("/reset-password/{token}", post(handle_reset_password))
        .route("/request-otp", post(handle_request_otp))
        .route("/verify-otp", post(handle_verify_otp))
        .route("/me", get(handle_me))
}
