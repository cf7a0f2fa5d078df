use crate::SessionId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// A client id or name that cannot be registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be a non-empty string")]
    Empty { field: &'static str },

    #[error(
        "Invalid client ID {0:?}: only groups of lower case letters and numbers are allowed, separated by underscores"
    )]
    InvalidId(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Client already registered: {0}")]
    DuplicateClient(String),

    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("Session initializer failed for {client}: {reason}")]
    InitializerFailed { client: String, reason: String },

    #[error("Client registry closed")]
    RegistryClosed,

    #[error("Invalid client definitions: {0}")]
    Definitions(#[from] serde_json::Error),
}
