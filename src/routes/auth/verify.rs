use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};

use crate::{errors::AuthError, responses::JsonResponse, state::AppState};

pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AuthError> {
    state.accounts.verify_email(&token).await?;
    Ok(JsonResponse::success("Email verified successfully! You can now log in.").into_response())
}
