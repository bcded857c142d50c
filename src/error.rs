use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the conversion, splitting and summarization stages.
///
/// Per-page OCR failures are not represented here: they are recorded on
/// the page's [`ExtractedText`](crate::utils::ocr::ExtractedText) and the run
/// continues.
#[derive(Debug, Error)]
pub enum DocError {
    #[error("unsupported document format: {} (expected .pdf or .epub)", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("page range {range} exceeds the document ({available} pages)")]
    PageRange { range: String, available: usize },

    #[error("invalid page range '{0}': expected START:END with 1 <= START <= END")]
    InvalidPageRange(String),

    #[error("unsupported OCR language '{code}' (installed: {})", .available.join(", "))]
    UnsupportedLanguage { code: String, available: Vec<String> },

    #[error("no headings of level {level} or higher found to split on")]
    NoBoundariesFound { level: u8 },

    #[error("no markdown files found in {}", .0.display())]
    EmptyDirectory(PathBuf),

    #[error("document has no text to summarize")]
    EmptyInput,

    #[error("summarization API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    #[error("{tool} failed: {message}")]
    Tool { tool: &'static str, message: String },

    #[error("failed to read {}: {message}", .path.display())]
    Document { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DocError>;

impl DocError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: &Path) -> impl FnOnce(std::io::Error) -> DocError + '_ {
        move |source| DocError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True for rejected credentials; retrying or moving on to the next
    /// file cannot succeed.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            DocError::Api {
                status: Some(401 | 403),
                ..
            }
        )
    }

    /// True for API failures worth another attempt: rate limiting, server
    /// errors and transport failures without a status.
    pub fn is_retryable(&self) -> bool {
        match self {
            DocError::Api { status: None, .. } => true,
            DocError::Api {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DocError {
    fn from(err: reqwest::Error) -> Self {
        DocError::Api {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_detection() {
        let err = DocError::Api {
            status: Some(401),
            message: "invalid api key".into(),
        };
        assert!(err.is_auth_failure());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_statuses() {
        let rate_limited = DocError::Api {
            status: Some(429),
            message: String::new(),
        };
        let transport = DocError::Api {
            status: None,
            message: "connection reset".into(),
        };
        let bad_request = DocError::Api {
            status: Some(400),
            message: String::new(),
        };
        assert!(rate_limited.is_retryable());
        assert!(transport.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!DocError::EmptyInput.is_retryable());
    }

    #[test]
    fn test_api_error_message_includes_status() {
        let err = DocError::Api {
            status: Some(503),
            message: "overloaded".into(),
        };
        assert_eq!(
            err.to_string(),
            "summarization API error (HTTP 503): overloaded"
        );
    }
}
