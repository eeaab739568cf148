//! Error types for kubeload-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Profile or CLI validation error
    #[error("invalid load profile: {0}")]
    Validation(String),

    /// Executor or request-builder construction error
    #[error("construction error: {0}")]
    Construction(String),

    /// REST client setup error
    #[error("client error: {0}")]
    Client(String),

    /// Run aborted through cancellation
    #[error("cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML decode error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error only reports cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error raised while executing a single request.
///
/// These are observations, not failures of the run: the scheduler records
/// them against the request's masked URL and keeps going.
#[derive(Error, Debug)]
pub enum RequestError {
    /// Transport-level error from the HTTP client
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response status
    #[error("unexpected status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Watch stream ended before the initial-events-end bookmark arrived
    #[error("watch stream ended without receiving bookmark")]
    MissingBookmark,

    /// Malformed event on a watch stream
    #[error("watch decode error: {0}")]
    WatchDecode(String),
}

impl RequestError {
    /// Classification key used to group errors in the final report.
    pub fn kind(&self) -> String {
        match self {
            RequestError::Http(err) if err.is_timeout() => "timeout".to_string(),
            RequestError::Http(err) if err.is_connect() => "connection".to_string(),
            RequestError::Http(_) => "http".to_string(),
            RequestError::Status { status } => format!("http:{status}"),
            RequestError::MissingBookmark | RequestError::WatchDecode(_) => "watch".to_string(),
        }
    }

    /// Whether the error is an HTTP/2 RST_STREAM carrying NO_ERROR.
    ///
    /// Per RFC 7540 section 8.1 a server may reset the stream with NO_ERROR
    /// after sending a complete response; clients must not discard the
    /// response because of it. Callers treat such an error as success.
    pub fn is_http2_stream_no_error(&self) -> bool {
        let RequestError::Http(err) = self else {
            return false;
        };
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(cause) = source {
            if let Some(h2_err) = cause.downcast_ref::<h2::Error>() {
                return h2_err.reason() == Some(h2::Reason::NO_ERROR);
            }
            source = cause.source();
        }
        false
    }
}
