//! # erp-auth
//!
//! Authentication and authorization for ERP RS.
//!
//! ## Features
//!
//! - JWT bearer tokens (HS256)
//! - Argon2 password hashing
//! - Centralized permission resolution (role ∪ active department permissions)
//! - Assignment-aware checks for projects and tasks

pub mod authenticator;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod resolver;

pub use authenticator::{AuthError, Authenticator, RequestHeaders};
pub use jwt::{Claims, JwtError, JwtService};
pub use password::{check_length, hash_password, verify_password, PasswordError};
pub use permissions::{builtin, is_valid_permission_name, validate_permission_names, CurrentUser, Permission};
pub use resolver::PermissionResolver;
