use axum::{
    extract::{Json, State},
    response::IntoResponse,
};

use crate::{
    errors::AuthError,
    models::payloads::{LoginPayload, LoginResponse, MeResponse},
    routes::{auth::session::AuthSession, extract::AppJson},
    state::AppState,
};

pub async fn handle_login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginPayload>,
) -> Result<impl IntoResponse, AuthError> {
    let session = state.accounts.login(&payload).await?;

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        token: session.token,
        user: session.user,
    }))
}

pub async fn handle_me(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<impl IntoResponse, AuthError> {
    let user = state.accounts.current_user(session.user_id).await?;
    Ok(Json(MeResponse {
        success: true,
        user,
    }))
}
