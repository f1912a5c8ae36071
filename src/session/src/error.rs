use thiserror::Error;

/// Session gate errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Invalid gate configuration: {0}")]
    InvalidConfig(String),

    #[error("No authenticated session")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, GateError>;
