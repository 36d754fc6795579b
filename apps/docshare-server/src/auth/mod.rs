//! Authentication: password hashing, JWT issue/verify and request extractors

mod extract;
mod password;
mod token;

pub use extract::{AuthUser, MaybeUser, RequireAdmin};
pub use password::{hash_password, verify_password};
pub use token::{Claims, JwtKeys};
