pub mod payloads;
pub mod user;
