pub mod account_service;
pub mod smtp_mailer;
pub mod token_issuer;
