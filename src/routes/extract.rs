use axum::extract::FromRequest;

use crate::errors::AuthError;

/// `axum::Json` whose rejection is an [`AuthError`], so a malformed body gets
/// the same 400 `JsonResponse` as any other validation failure.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AuthError))]
pub struct AppJson<T>(pub T);
