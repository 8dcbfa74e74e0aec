//! `wardgate-auth`: session tokens and caller resolution.
//!
//! This crate is intentionally decoupled from any HTTP framework; it only
//! speaks `http::HeaderMap`.

pub mod claims;
pub mod cookies;
pub mod error;
pub mod password;
pub mod principal;
pub mod session;
pub mod token;

pub use claims::{SessionClaims, TokenError, validate_age};
pub use cookies::{CSRF_COOKIE_NAME, SESSION_COOKIE_NAME, cookie_value};
pub use error::AuthError;
pub use password::{hash_password, verify_password};
pub use principal::{Caller, UserLoader};
pub use session::SessionAuthenticator;
pub use token::TokenCodec;
