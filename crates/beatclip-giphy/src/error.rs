//! Keyword fetch error types.

use thiserror::Error;

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GIPHY returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let throttled = FetchError::Status {
            status: 429,
            body: String::new(),
        };
        let forbidden = FetchError::Status {
            status: 403,
            body: String::new(),
        };
        assert!(throttled.is_retryable());
        assert!(!forbidden.is_retryable());
        assert!(!FetchError::InvalidResponse("x".into()).is_retryable());
    }
}
