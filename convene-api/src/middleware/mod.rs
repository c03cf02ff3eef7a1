pub mod auth;

pub use auth::{require_auth, user_from_headers, AuthUser, Claims};
