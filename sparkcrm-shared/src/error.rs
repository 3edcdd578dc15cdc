/// Error taxonomy for SparkCRM
///
/// Every failure coming out of a remote collaborator is mapped into one of
/// four kinds at the boundary of this crate. Collaborator-specific error
/// types (`reqwest::Error`, HTTP statuses, token errors) never travel past the
/// record store interface.
///
/// # Kinds
///
/// - **Auth**: invalid credentials, expired or absent session
/// - **Validation**: empty required field or a remote rejection of the payload
/// - **Remote**: collaborator unreachable or returned a failure
/// - **NotFound**: the identifier does not name an existing record
///
/// # Example
///
/// ```
/// use sparkcrm_shared::error::CrmError;
///
/// let err = CrmError::Remote("connection reset by peer (10.0.0.4:443)".to_string());
/// assert_eq!(err.short_cause(), "service unavailable");
/// ```

use crate::auth::password::PasswordError;
use crate::auth::token::TokenError;

/// Result type alias used across SparkCRM crates
pub type CrmResult<T> = Result<T, CrmError>;

/// Closed error enumeration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrmError {
    /// Authentication failed or no usable session exists
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Input rejected before or by the remote collaborator
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote collaborator unreachable or failed
    #[error("Remote error: {0}")]
    Remote(String),

    /// Record does not exist (or is not visible to this user)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Discriminant of [`CrmError`], handy for assertions and log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Validation,
    Remote,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Validation => "validation",
            ErrorKind::Remote => "remote",
            ErrorKind::NotFound => "not_found",
        }
    }
}

impl CrmError {
    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrmError::Auth(_) => ErrorKind::Auth,
            CrmError::Validation(_) => ErrorKind::Validation,
            CrmError::Remote(_) => ErrorKind::Remote,
            CrmError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Short, user-facing cause string
    ///
    /// Validation messages are surfaced verbatim because they describe the
    /// user's own input. Everything else collapses to a fixed phrase so that
    /// transport detail (hosts, SQL, stack traces) never reaches the screen.
    pub fn short_cause(&self) -> String {
        match self {
            CrmError::Auth(_) => "not signed in".to_string(),
            CrmError::Validation(msg) => msg.clone(),
            CrmError::Remote(_) => "service unavailable".to_string(),
            CrmError::NotFound(_) => "record not found".to_string(),
        }
    }

    /// Shorthand for an absent session
    pub fn no_session() -> Self {
        CrmError::Auth("No active session".to_string())
    }
}

impl From<validator::ValidationErrors> for CrmError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        messages.dedup();

        if messages.is_empty() {
            CrmError::Validation("Invalid input".to_string())
        } else {
            CrmError::Validation(messages.join("; "))
        }
    }
}

impl From<reqwest::Error> for CrmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CrmError::Remote(format!("Malformed response: {}", err))
        } else if err.is_timeout() {
            CrmError::Remote("Request timed out".to_string())
        } else {
            CrmError::Remote(format!("Request failed: {}", err))
        }
    }
}

impl From<TokenError> for CrmError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => CrmError::Auth("Session expired".to_string()),
            other => CrmError::Auth(other.to_string()),
        }
    }
}

impl From<PasswordError> for CrmError {
    fn from(err: PasswordError) -> Self {
        CrmError::Remote(format!("Password operation failed: {}", err))
    }
}
