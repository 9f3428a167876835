use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{
    errors::AuthError,
    models::payloads::{EmailPayload, VerifyOtpPayload, VerifyOtpResponse},
    responses::JsonResponse,
    routes::extract::AppJson,
    state::AppState,
};

pub async fn handle_request_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailPayload>,
) -> Result<Response, AuthError> {
    state.accounts.request_otp(&payload.email).await?;
    Ok(JsonResponse::success("OTP sent to your email").into_response())
}

/// Failures, including an unreadable body, keep the usual error body but also
/// carry `verified: false`.
pub async fn handle_verify_otp(
    State(state): State<AppState>,
    payload: Result<AppJson<VerifyOtpPayload>, AuthError>,
) -> Response {
    let outcome = match payload {
        Ok(AppJson(payload)) => state.accounts.verify_otp(&payload).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(session) => Json(VerifyOtpResponse {
            success: true,
            verified: true,
            message: "Login successful".to_string(),
            token: session.token,
            user: session.user,
        })
        .into_response(),
        Err(err) => otp_failure(err),
    }
}

fn otp_failure(err: AuthError) -> Response {
    err.log();
    (
        err.status(),
        Json(json!({
            "status": "error",
            "success": false,
            "verified": false,
            "message": err.to_string(),
            "code": err.code(),
        })),
    )
        .into_response()
}
