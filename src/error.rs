use std::time::Duration;

use bb8::RunError;
use google_api_proto::google::rpc;
use prost::Message;
use tonic::Code;

const RETRY_INFO_TYPE_URL: &str = "type.googleapis.com/google.rpc.RetryInfo";

/// The DB-API exception hierarchy, minus `Warning`.
///
/// Every [`Error`] belongs to exactly one of these kinds, see [`Error::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Interface,
    Database,
    Data,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
}

impl ErrorKind {
    /// Whether this kind is a subclass of `DatabaseError` in the DB-API hierarchy.
    pub fn is_database_error(&self) -> bool {
        !matches!(self, ErrorKind::Interface)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("interface error: {0}")]
    Interface(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("data error: {0}")]
    Data(String),
    #[error("operational error: {0}")]
    Operational(String),
    #[error("integrity error: {0}")]
    Integrity(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("programming error: {0}")]
    Programming(String),
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The server aborted the current read/write transaction.
    #[error("transaction aborted: {message}")]
    Aborted {
        message: String,
        retry_delay: Option<Duration>,
    },

    /// Replaying an aborted transaction observed different results than the original attempt.
    #[error("transaction aborted with divergent results: {0}")]
    RetryAborted(String),

    #[error("session is no longer valid: {0}")]
    SessionNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
    #[error("codec error: {0}")]
    Codec(String),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Interface(_) | Error::Config(_) => ErrorKind::Interface,
            Error::Database(_) => ErrorKind::Database,
            Error::Data(_) | Error::Codec(_) => ErrorKind::Data,
            Error::Operational(_)
            | Error::Aborted { .. }
            | Error::RetryAborted(_)
            | Error::SessionNotFound(_)
            | Error::Transport(_) => ErrorKind::Operational,
            Error::Integrity(_) => ErrorKind::Integrity,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Programming(_) => ErrorKind::Programming,
            Error::NotSupported(_) => ErrorKind::NotSupported,
        }
    }

    /// Errors after which the transaction can be replayed on a fresh attempt.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Error::Aborted { .. } | Error::SessionNotFound(_))
    }

    pub(crate) fn retry_delay(&self) -> Option<Duration> {
        match self {
            Error::Aborted { retry_delay, .. } => *retry_delay,
            _ => None,
        }
    }

    pub(crate) fn closed(what: &str) -> Self {
        Error::Interface(format!("{} is already closed", what))
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::InvalidArgument => Error::Programming(message),
            Code::AlreadyExists | Code::FailedPrecondition => Error::Integrity(message),
            Code::Internal | Code::Unavailable | Code::DeadlineExceeded => {
                Error::Operational(message)
            }
            Code::Aborted => Error::Aborted {
                retry_delay: retry_delay(status.details()),
                message,
            },
            Code::NotFound if message.contains("Session not found") => {
                Error::SessionNotFound(message)
            }
            Code::OutOfRange => Error::Data(message),
            Code::Unimplemented => Error::NotSupported(message),
            Code::PermissionDenied | Code::Unauthenticated | Code::ResourceExhausted => {
                Error::Operational(message)
            }
            _ => Error::Database(format!("{:?}: {}", status.code(), message)),
        }
    }
}

// ABORTED statuses may carry a google.rpc.RetryInfo detail telling us how long to back off.
fn retry_delay(details: &[u8]) -> Option<Duration> {
    if details.is_empty() {
        return None;
    }
    let status = rpc::Status::decode(details).ok()?;
    status
        .details
        .iter()
        .filter(|any| any.type_url == RETRY_INFO_TYPE_URL)
        .find_map(|any| rpc::RetryInfo::decode(any.value.as_slice()).ok())
        .and_then(|info| info.retry_delay)
        .map(|delay| Duration::new(delay.seconds.max(0) as u64, delay.nanos.max(0) as u32))
}

impl From<RunError<Error>> for Error {
    fn from(value: RunError<Error>) -> Self {
        match value {
            RunError::User(error) => error,
            RunError::TimedOut => {
                Error::Operational("timeout while checking out a session".to_string())
            }
        }
    }
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(value: derive_builder::UninitializedFieldError) -> Self {
        Error::Config(value.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Operational("deadline exceeded".to_string())
    }
}
