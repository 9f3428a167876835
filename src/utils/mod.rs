pub mod clock;
pub mod email;
pub mod jwt;
pub mod password;
