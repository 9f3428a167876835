use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};

use crate::{
    errors::AuthError,
    models::payloads::ResetPasswordPayload,
    responses::JsonResponse,
    routes::extract::AppJson,
    services::token_issuer::TokenKind,
    state::AppState,
};

pub async fn handle_verify_reset_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AuthError> {
    if !state.accounts.verify_reset_token(&token).await? {
        return Err(AuthError::InvalidToken(TokenKind::Reset));
    }
    Ok(JsonResponse::success("Token is valid").into_response())
}

pub async fn handle_reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    AppJson(payload): AppJson<ResetPasswordPayload>,
) -> Result<Response, AuthError> {
    state.accounts.reset_password(&token, &payload).await?;
    Ok(JsonResponse::success(
        "Password reset successful! You can now log in with your new password.",
    )
    .into_response())
}
