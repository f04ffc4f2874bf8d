//! Unified error type for the attendance data layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// API quota exhausted (HTTP 429 / RESOURCE_EXHAUSTED). Retryable.
    #[error("Sheets API quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Credential or permission failure (HTTP 401/403). Not retryable.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Spreadsheet or tab does not exist (HTTP 404). Not retryable.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network-level failure (DNS/TLS/socket, 5xx). Retryable.
    #[error("Transient error: {0}")]
    Transient(String),

    /// Response or grid did not have the expected shape.
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// Invalid or missing configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A retryable operation failed on every attempt.
    #[error("Giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether the retry policy should re-run the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QuotaExceeded(_) | Error::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::QuotaExceeded("429".into()).is_retryable());
        assert!(Error::Transient("connection reset".into()).is_retryable());
        assert!(!Error::Unauthorized("bad key".into()).is_retryable());
        assert!(!Error::NotFound("no such tab".into()).is_retryable());
        assert!(!Error::Malformed("short row".into()).is_retryable());
    }

    #[test]
    fn test_exhausted_keeps_last_error() {
        let err = Error::RetriesExhausted {
            attempts: 4,
            source: Box::new(Error::QuotaExceeded("quota".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("quota"));
    }
}
