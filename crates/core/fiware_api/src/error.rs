use reqwest::StatusCode;
use std::fmt::Display;

/// How an error has to be handled by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource doesn't exist: success for a deletion, absence for a query
    NotFound,

    /// The resource already exists or is in a state preventing the request
    Conflict,

    /// Network failure, timeout or server error: the request can be retried
    Transient,

    /// Any other failure: the request must not be retried
    Fatal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(kind)
    }
}

/// An error returned by a platform component
#[derive(thiserror::Error, Debug)]
pub enum PlatformError {
    #[error("{method} {url}: not found: {body}")]
    NotFound {
        method: String,
        url: String,
        body: String,
    },

    #[error("{method} {url}: conflict ({status}): {body}")]
    Conflict {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("{method} {url}: temporary failure: {reason}")]
    Transient {
        method: String,
        url: String,
        reason: String,
    },

    #[error("{method} {url}: failed with status {status}: {body}")]
    Fatal {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("{method} {url}: request failed: {reason}")]
    Request {
        method: String,
        url: String,
        reason: String,
    },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },
}

impl PlatformError {
    /// Classify a response status which is not a success
    pub fn from_status(
        method: impl Into<String>,
        url: impl Into<String>,
        status: StatusCode,
        body: impl Into<String>,
    ) -> PlatformError {
        let (method, url, body) = (method.into(), url.into(), body.into());
        match status {
            StatusCode::NOT_FOUND => PlatformError::NotFound { method, url, body },
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => PlatformError::Conflict {
                method,
                url,
                status: status.as_u16(),
                body,
            },
            status if status.is_server_error() => PlatformError::Transient {
                method,
                url,
                reason: format!("status {status}: {body}"),
            },
            status => PlatformError::Fatal {
                method,
                url,
                status: status.as_u16(),
                body,
            },
        }
    }

    /// Classify a request that failed without a response
    pub fn from_reqwest(
        method: impl Into<String>,
        url: impl Into<String>,
        err: reqwest::Error,
    ) -> PlatformError {
        let (method, url) = (method.into(), url.into());
        if err.is_timeout() || err.is_connect() || err.is_request() {
            PlatformError::Transient {
                method,
                url,
                reason: err.to_string(),
            }
        } else {
            PlatformError::Request {
                method,
                url,
                reason: err.to_string(),
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PlatformError::NotFound { .. } => ErrorKind::NotFound,
            PlatformError::Conflict { .. } => ErrorKind::Conflict,
            PlatformError::Transient { .. } => ErrorKind::Transient,
            PlatformError::Fatal { .. }
            | PlatformError::Request { .. }
            | PlatformError::InvalidResponse { .. }
            | PlatformError::InvalidRequest { .. }
            | PlatformError::InvalidUrl { .. } => ErrorKind::Fatal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// The HTTP status returned by the platform, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::NotFound { .. } => Some(404),
            PlatformError::Conflict { status, .. } | PlatformError::Fatal { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Turns a `NotFound` error into a success
pub trait IgnoreNotFound<T> {
    fn ignore_not_found(self) -> Result<Option<T>, PlatformError>;
}

impl<T> IgnoreNotFound<T> for Result<T, PlatformError> {
    fn ignore_not_found(self) -> Result<Option<T>, PlatformError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
