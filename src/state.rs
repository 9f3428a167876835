use std::sync::Arc;

use crate::{services::account_service::AccountService, utils::jwt::JwtSettings};

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub jwt: Arc<JwtSettings>,
}

impl AppState {
    pub fn new(accounts: AccountService, jwt: Arc<JwtSettings>) -> Self {
        Self {
            accounts: Arc::new(accounts),
            jwt,
        }
    }
}
