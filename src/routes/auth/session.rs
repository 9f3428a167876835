use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::{responses::JsonResponse, routes::auth::claims::Claims, state::AppState};

/// A request carrying a valid `Authorization: Bearer` session credential.
#[derive(Debug, PartialEq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub claims: Claims,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| unauthorized())?;

        let claims = state
            .jwt
            .verify_session(bearer.token())
            .map_err(|_| unauthorized())?;
        let user_id = Uuid::parse_str(&claims.id).map_err(|_| unauthorized())?;

        Ok(AuthSession { user_id, claims })
    }
}

fn unauthorized() -> Response {
    JsonResponse::unauthorized("Not authenticated").into_response()
}
