use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    errors::AuthError,
    models::payloads::{RegisterPayload, RegisterResponse},
    routes::extract::AppJson,
    state::AppState,
};

pub async fn handle_register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterPayload>,
) -> Result<impl IntoResponse, AuthError> {
    let user_id = state.accounts.register(&payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "Registration successful! Please check your email to verify your account."
                .to_string(),
            user_id,
        }),
    ))
}
