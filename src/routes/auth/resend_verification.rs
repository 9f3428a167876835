use axum::{
    extract::State,
    response::{IntoResponse, Response},
};

use crate::{
    errors::AuthError, models::payloads::EmailPayload, responses::JsonResponse,
    routes::extract::AppJson, state::AppState,
};

pub async fn handle_resend_verification(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailPayload>,
) -> Result<Response, AuthError> {
    state.accounts.resend_verification(&payload.email).await?;
    Ok(JsonResponse::success("Verification email resent successfully").into_response())
}
