use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid"));

/// Emails are stored case-sensitively; only surrounding whitespace is dropped.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_string()
}

/// Basic shape check, same rule the signup form applies client side.
pub fn valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}
