use serde::{Deserialize, Serialize};

/// Session credential payload. Only the user id travels in the token.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Claims {
    pub id: String, // user UUID
    pub exp: usize, // expiration (as UNIX timestamp)
    pub iat: usize,
    pub iss: String,
    pub aud: String,
}
