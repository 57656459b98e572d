//! Error types for the device catalog.

use tonic::Status;

/// Main error type for the catalog stores, auth layer and RPC handlers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input: bad identifier, oversized upload or stream protocol violation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced device, image or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with the same key is already stored.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The call carried no usable credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller's role may not invoke the method.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The bearer token was well-formed and signed but is past its expiry.
    #[error("access token expired")]
    TokenExpired,

    /// The bearer token failed to decode or its signature did not verify.
    #[error("access token is invalid: {0}")]
    InvalidToken(String),

    /// The caller cancelled the call.
    #[error("request is cancelled")]
    Cancelled,

    /// The call's deadline passed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// Hashing, signing or other server-side failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// Filesystem failure in the image store or serializer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::InvalidArgument(_) => Status::invalid_argument(message),
            Error::NotFound(_) => Status::not_found(message),
            Error::AlreadyExists(_) => Status::already_exists(message),
            Error::Unauthenticated(_) | Error::TokenExpired | Error::InvalidToken(_) => {
                Status::unauthenticated(message)
            }
            Error::PermissionDenied(_) => Status::permission_denied(message),
            Error::Cancelled => Status::cancelled(message),
            Error::DeadlineExceeded => Status::deadline_exceeded(message),
            Error::Internal(_) | Error::Io(_) => Status::internal(message),
        }
    }
}
