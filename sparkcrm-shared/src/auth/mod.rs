/// Authentication primitives
///
/// # Modules
///
/// - [`token`]: HS256 session token issue and validation
/// - [`password`]: Argon2id password hashing and length rule
///
/// Both are used by the in-memory auth directory. The REST backend delegates
/// these concerns to the hosted auth service.

pub mod password;
pub mod token;
