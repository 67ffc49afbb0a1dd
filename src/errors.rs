//! Error types.

use serde::Deserialize;

use crate::redact::redact;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The HTTP request could not be completed (connection refused, TLS failure, timeout...).
    #[error("request to the Data Plane API failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The Data Plane API answered with a non-success status.
    #[error("Data Plane API returned {status}: {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// The `code` field of the API error payload, when present.
        code: Option<i64>,
        /// The `message` field of the API error payload, or the raw body.
        message: String,
        /// The raw response body.
        body: String,
    },

    /// A response body did not have the shape expected for the configured API version.
    #[error("failed to decode Data Plane API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The client was configured with unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A single step of a larger operation failed; names the step that failed.
    #[error("{action} {target}: {source}")]
    Operation {
        action: &'static str,
        target: String,
        #[source]
        source: Box<Error>,
    },

    /// Every attempt of a retried operation failed with a retryable error.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },
}

/// The coarse category of an [`Error`], used by the retry classifier.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    Transport,
    Api,
    Decode,
    InvalidConfig,
    Cancelled,
    RetriesExhausted,
}

#[derive(Deserialize)]
struct ApiErrorPayload {
    code: Option<i64>,
    message: Option<String>,
}

impl Error {
    /// Build an `Api` error from a response status and body.
    ///
    /// The Data Plane API reports failures as `{"code": ..., "message": ...}`; bodies that do not
    /// parse that way are kept verbatim as the message. Credentials echoed back by the server are
    /// redacted from both.
    pub fn api(status: u16, body: String) -> Self {
        let body = redact(&body);
        let payload = serde_json::from_str::<ApiErrorPayload>(&body).ok();
        let code = payload.as_ref().and_then(|p| p.code);
        let message = payload
            .and_then(|p| p.message)
            .map(|message| redact(&message))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.trim().to_string()
                }
            });

        Error::Api {
            status,
            code,
            message,
            body,
        }
    }

    /// Attach the name of the failed step to an error.
    pub fn during(self, action: &'static str, target: impl Into<String>) -> Self {
        Error::Operation {
            action,
            target: target.into(),
            source: Box::new(self),
        }
    }

    /// The error underneath any `Operation` context.
    pub fn innermost(&self) -> &Error {
        match self {
            Error::Operation { source, .. } => source.innermost(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Api { .. } => ErrorKind::Api,
            Error::Decode(_) => ErrorKind::Decode,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Error::Operation { source, .. } => source.kind(),
        }
    }

    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self.innermost() {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text the classifier searches: the API message and body, or the rendered error.
    pub fn diagnostic_text(&self) -> String {
        match self.innermost() {
            Error::Api { message, body, .. } => format!("{} {}", message, body),
            other => other.to_string(),
        }
    }

    /// Whether the API reported the target object as absent.
    ///
    /// A 404 about the transaction itself ("transaction ... does not exist") is a concurrency
    /// failure, not a missing object.
    pub fn is_not_found(&self) -> bool {
        if self.is_retryable() {
            return false;
        }
        self.status() == Some(404)
            || (self.kind() == ErrorKind::Api
                && self.diagnostic_text().to_lowercase().contains("missing object"))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidConfig(format!("invalid base URL: {}", err))
    }
}
