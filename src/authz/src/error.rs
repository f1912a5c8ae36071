//! Error types for the authorization layer

use thiserror::Error;

/// Authorization layer errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid rule set definition
    #[error("Invalid rule set: {0}")]
    InvalidRuleSet(String),

    /// Caller is not allowed to perform an administrative operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Profile does not exist
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a role lookup that did not produce a grant.
///
/// Both variants mean "no privileges"; they stay distinct for observability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The actor has no profile row
    #[error("no profile for actor")]
    NotFound,

    /// The profile store could not be reached in time
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
