//! Authentication module: password hashing, session tokens, session middleware

pub mod middleware;
pub mod password;
pub mod token;

pub use middleware::{extract_token, session_auth_middleware, SessionContext};
pub use password::PasswordHasher;
pub use token::SessionToken;
