//! Error types for playlist-dl library
//!
//! Provides the error taxonomy shared by resolution, transfer and conversion.

use std::fmt;

/// One provider's reason for not producing a playlist
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    /// Provider name as configured
    pub provider: String,
    /// Human-readable failure detail
    pub detail: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.detail)
    }
}

/// Main error type for playlist-dl operations
#[derive(Debug)]
pub enum Error {
    /// Network connectivity issues (timeouts, resets, DNS)
    NetworkError(String),

    /// HTTP-specific error (non-2xx status, unreadable body)
    HttpError(String),

    /// Provider answered with a JSON shape we cannot map
    ShapeMismatch { provider: String, detail: String },

    /// A single playlist entry could not be mapped to an item
    ItemExtraction(String),

    /// Every configured provider failed or returned no usable items
    AllProvidersExhausted {
        list_id: String,
        failures: Vec<ProviderFailure>,
    },

    /// Location source answered without a usable location
    LocationUnavailable(String),

    /// Conversion tool exited with failure or produced no output
    ToolFailed(String),

    /// Conversion tool could not be located
    ToolUnavailable(String),

    /// Invalid or incomplete configuration
    Config(String),

    /// Malformed JSON
    Json(serde_json::Error),

    /// File I/O error
    IoError(std::io::Error),

    /// Run stopped by its cancellation token
    Cancelled,
}

impl Error {
    /// Whether the transport layer should try the request again
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NetworkError(_) | Error::HttpError(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NetworkError(msg) => {
                write!(f, "Network error: {msg}")
            }
            Error::HttpError(msg) => {
                write!(f, "HTTP error: {msg}")
            }
            Error::ShapeMismatch { provider, detail } => {
                write!(f, "Unexpected response shape from {provider}: {detail}")
            }
            Error::ItemExtraction(msg) => {
                write!(f, "Item extraction failed: {msg}")
            }
            Error::AllProvidersExhausted { list_id, failures } => {
                write!(f, "All playlist providers failed for list '{list_id}'")?;
                if failures.is_empty() {
                    return write!(f, " (no providers configured)");
                }
                let details: Vec<String> = failures.iter().map(|p| p.to_string()).collect();
                write!(f, ": {}", details.join("; "))
            }
            Error::LocationUnavailable(msg) => {
                write!(f, "No download location: {msg}")
            }
            Error::ToolFailed(msg) => {
                write!(f, "Conversion failed: {msg}")
            }
            Error::ToolUnavailable(msg) => {
                write!(f, "Conversion tool unavailable: {msg}")
            }
            Error::Config(msg) => {
                write!(f, "Configuration error: {msg}")
            }
            Error::Json(err) => {
                write!(f, "JSON error: {err}")
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {err}")
            }
            Error::Cancelled => {
                write!(f, "Operation cancelled")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Error::NetworkError(err.to_string())
        } else {
            Error::HttpError(err.to_string())
        }
    }
}

/// Convenience result type for playlist-dl operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::NetworkError("reset".into()).is_transient());
        assert!(Error::HttpError("503".into()).is_transient());
        assert!(!Error::Config("missing".into()).is_transient());
        assert!(!Error::LocationUnavailable("empty".into()).is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn test_exhausted_names_every_provider() {
        let err = Error::AllProvidersExhausted {
            list_id: "3778678".to_string(),
            failures: vec![
                ProviderFailure {
                    provider: "primary".to_string(),
                    detail: crate::core::resolver::NO_USABLE_ITEMS.to_string(),
                },
                ProviderFailure {
                    provider: "mirror".to_string(),
                    detail: "HTTP error: 502 Bad Gateway".to_string(),
                },
            ],
        };
        let message = err.to_string();
        assert!(message.contains("3778678"));
        assert!(message.contains("primary: returned no usable items"));
        assert!(message.contains("mirror: HTTP error: 502 Bad Gateway"));
    }

    #[test]
    fn test_exhausted_without_providers() {
        let err = Error::AllProvidersExhausted {
            list_id: "1".to_string(),
            failures: Vec::new(),
        };
        assert!(err.to_string().contains("no providers configured"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
