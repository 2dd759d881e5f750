use thiserror::Error;

/// Failure to obtain a page from the network
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP status {code} for {url}")]
    HttpStatus { code: u16, url: String },
}

impl FetchError {
    /// Timeouts, connection failures, 429 and 5xx are worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) => true,
            FetchError::HttpStatus { code, .. } => *code == 429 || *code >= 500,
        }
    }
}

/// A detail page that does not look like a listing at all
#[derive(Debug, Error, Clone, PartialEq)]
#[error("malformed page {url}: {reason}")]
pub struct MalformedPageError {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Constraint violation on the listing table; never retried
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

/// Why a single listing could not be ingested
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Malformed(#[from] MalformedPageError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures that end a run before any listing is processed
#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot resolve source '{name}': {source}")]
    SourceResolution {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("discovery failed on the first index page: {0}")]
    Discovery(#[source] FetchError),

    #[error("ingestion service is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> FetchError {
        FetchError::HttpStatus {
            code,
            url: "https://example.com".to_string(),
        }
    }

    #[test]
    fn classifies_transient_failures() {
        assert!(FetchError::Timeout("slow".into()).is_transient());
        assert!(FetchError::Network("reset".into()).is_transient());
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
    }
}
