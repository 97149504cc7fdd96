use std::path::PathBuf;

/// Failure of a single backend call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("{operation} request failed: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status.
    #[error("{operation} returned status {status}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

impl TransportError {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Request { operation, .. } | Self::Status { operation, .. } => operation,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { source, .. } => source.is_connect() || source.is_timeout(),
            Self::Status { status, .. } => matches!(status, 429 | 500..=599),
        }
    }
}

/// Failure of an upload, either before or during the backend call.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retryable() {
        let err = TransportError::Status { operation: "query", status: 503, body: String::new() };
        assert!(err.is_retryable());
        let err = TransportError::Status { operation: "query", status: 429, body: String::new() };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_not_retryable() {
        let err = TransportError::Status { operation: "upload", status: 400, body: "bad".into() };
        assert!(!err.is_retryable());
        assert_eq!(err.operation(), "upload");
        assert_eq!(err.to_string(), "upload returned status 400");
    }

    #[test]
    fn test_upload_error_wraps_transport() {
        let err: UploadError =
            TransportError::Status { operation: "upload", status: 413, body: String::new() }.into();
        assert_eq!(err.to_string(), "upload returned status 413");
        assert!(matches!(err, UploadError::Transport(TransportError::Status { status: 413, .. })));
    }
}
