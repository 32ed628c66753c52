use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Network-level failure observed before any response was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    Dns,
    Other,
}

/// Failure of a call to a partner platform, classified for the retry executor.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport failure ({kind:?}): {message}")]
    Transport {
        kind: TransportFailure,
        message: String,
    },
    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Request or response failed validation; resending the same request cannot help.
    #[error("remote call rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RemoteError {
    pub fn transport(kind: TransportFailure, message: impl Into<String>) -> Self {
        RemoteError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        RemoteError::Status {
            status,
            body: body.into(),
        }
    }

    /// Network-level failures and 5xx responses are transient; everything else is final.
    ///
    /// ```
    /// use bridge_retry::{RemoteError, TransportFailure};
    ///
    /// assert!(RemoteError::from_status(502, "bad gateway").is_retryable());
    /// assert!(!RemoteError::from_status(404, "missing").is_retryable());
    /// assert!(RemoteError::transport(TransportFailure::Dns, "lookup").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport { .. } => true,
            RemoteError::Status { status, .. } => *status >= 500,
            RemoteError::Rejected(_) | RemoteError::Other(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<io::Error> for RemoteError {
    fn from(err: io::Error) -> Self {
        let kind = io_failure(&err).unwrap_or(TransportFailure::Other);
        RemoteError::transport(kind, err.to_string())
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return RemoteError::from_status(status.as_u16(), err.to_string());
        }
        if err.is_timeout() {
            return RemoteError::transport(TransportFailure::Timeout, err.to_string());
        }
        if err.is_connect() || err.is_request() {
            let kind = chain_failure(&err).unwrap_or(if err.is_connect() {
                TransportFailure::ConnectionRefused
            } else {
                TransportFailure::Other
            });
            return RemoteError::transport(kind, err.to_string());
        }
        if err.is_decode() || err.is_builder() {
            return RemoteError::Rejected(err.to_string());
        }
        RemoteError::Other(anyhow::Error::new(err))
    }
}

fn io_failure(err: &io::Error) -> Option<TransportFailure> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => Some(TransportFailure::ConnectionRefused),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Some(TransportFailure::ConnectionReset),
        io::ErrorKind::TimedOut => Some(TransportFailure::Timeout),
        _ => None,
    }
}

fn chain_failure(err: &(dyn StdError + 'static)) -> Option<TransportFailure> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = current {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if let Some(kind) = io_failure(io_err) {
                return Some(kind);
            }
        }
        let text = cause.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return Some(TransportFailure::Dns);
        }
        current = cause.source();
    }
    None
}
