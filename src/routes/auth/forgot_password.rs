use axum::{
    extract::State,
    response::{IntoResponse, Response},
};

use crate::{
    errors::AuthError, models::payloads::EmailPayload, responses::JsonResponse,
    routes::extract::AppJson, state::AppState,
};

pub async fn handle_forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailPayload>,
) -> Result<Response, AuthError> {
    state.accounts.forgot_password(&payload.email).await?;
    Ok(JsonResponse::success("Password reset email sent successfully").into_response())
}
