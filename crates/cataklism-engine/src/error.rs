//! Monitor errors.

use thiserror::Error;

use cataklism_config::ConfigError;

/// Failure of a single fetch from an external system.
///
/// Classified at the point of failure so callers never inspect messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request did not complete within its deadline.
    #[error("Request timed out")]
    Timeout,

    /// The remote system could not be reached or refused the request.
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),

    /// The remote system answered with something that could not be decoded.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() || e.is_body() {
            FetchError::MalformedResponse(e.to_string())
        } else {
            FetchError::Unreachable(e.to_string())
        }
    }
}

/// Storage backend errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not complete the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Monitor error types.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Fetching from a metric source failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The durable store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A notifier failed to deliver an alert.
    #[error("Notifier {notifier} failed: {message}")]
    NotifierFailure { notifier: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Report generation or output failed.
    #[error("Report error: {0}")]
    Report(String),

    /// Generic error.
    #[error("{0}")]
    Custom(String),
}

/// Error taxonomy used for classification and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FetchTimeout,
    FetchUnreachable,
    FetchMalformed,
    StoreUnavailable,
    NotifierFailure,
    ConfigInvalid,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FetchTimeout => "fetch_timeout",
            ErrorKind::FetchUnreachable => "fetch_unreachable",
            ErrorKind::FetchMalformed => "fetch_malformed",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::NotifierFailure => "notifier_failure",
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::Other => "other",
        }
    }
}

impl MonitorError {
    /// Build a notifier failure.
    pub fn notifier(notifier: impl Into<String>, message: impl Into<String>) -> Self {
        MonitorError::NotifierFailure {
            notifier: notifier.into(),
            message: message.into(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Fetch(FetchError::Timeout) => ErrorKind::FetchTimeout,
            MonitorError::Fetch(FetchError::Unreachable(_)) => ErrorKind::FetchUnreachable,
            MonitorError::Fetch(FetchError::MalformedResponse(_)) => ErrorKind::FetchMalformed,
            MonitorError::Store(_) => ErrorKind::StoreUnavailable,
            MonitorError::NotifierFailure { .. } => ErrorKind::NotifierFailure,
            MonitorError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            MonitorError::Report(_) | MonitorError::Custom(_) => ErrorKind::Other,
        }
    }
}

impl From<ConfigError> for MonitorError {
    fn from(e: ConfigError) -> Self {
        MonitorError::ConfigInvalid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kinds() {
        assert_eq!(
            MonitorError::from(FetchError::Timeout).kind(),
            ErrorKind::FetchTimeout
        );
        assert_eq!(
            MonitorError::from(FetchError::Unreachable("refused".into())).kind(),
            ErrorKind::FetchUnreachable
        );
        assert_eq!(
            MonitorError::from(FetchError::MalformedResponse("eof".into())).kind(),
            ErrorKind::FetchMalformed
        );
    }

    #[test]
    fn test_store_error_kind() {
        let err = MonitorError::from(StoreError::Unavailable("disk full".into()));
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_notifier_error_display() {
        let err = MonitorError::notifier("discord", "HTTP 500");
        assert_eq!(err.kind(), ErrorKind::NotifierFailure);
        assert_eq!(err.to_string(), "Notifier discord failed: HTTP 500");
    }

    #[test]
    fn test_config_error_conversion() {
        let err = MonitorError::from(ConfigError::Invalid("bad rule".into()));
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ErrorKind::FetchTimeout.as_str(), "fetch_timeout");
        assert_eq!(ErrorKind::StoreUnavailable.as_str(), "store_unavailable");
    }
}
