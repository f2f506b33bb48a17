use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Empty response body")]
    NoData,

    #[error("Failed to decode response: {0}")]
    Decoding(#[source] serde_json::Error),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("No network connection")]
    NoConnection,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    /// Map a non-success HTTP status into a typed error. 401 is
    /// distinguished so callers can trigger re-authentication; every other
    /// non-2xx status keeps its code (1xx/3xx should never reach us since
    /// redirects are followed, but they get the same treatment).
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            code => {
                warn!(status = code, body = %Self::truncate_body(body), "Non-success response");
                ApiError::ServerError(code)
            }
        }
    }

    /// Classify a reqwest transport failure. Connection-level failures map
    /// to `NoConnection` so the sync engine can treat them as an offline
    /// signal; everything else stays a generic network error.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() {
            ApiError::NoConnection
        } else {
            ApiError::Network(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_unauthorized() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
    }

    #[test]
    fn test_from_status_server_error_keeps_code() {
        match ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "down") {
            ApiError::ServerError(code) => assert_eq!(code, 503),
            other => panic!("expected ServerError, got {:?}", other),
        }
        match ApiError::from_status(StatusCode::NOT_FOUND, "") {
            ApiError::ServerError(code) => assert_eq!(code, 404),
            other => panic!("expected ServerError, got {:?}", other),
        }
    }

    #[test]
    fn test_from_status_odd_status_keeps_code() {
        // 1xx/3xx should never reach us, but the mapping must not panic
        // and must preserve the status code.
        assert!(matches!(
            ApiError::from_status(StatusCode::CONTINUE, ""),
            ApiError::ServerError(100)
        ));
    }

    #[test]
    fn test_truncate_body_limits_length() {
        let body = "x".repeat(2000);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.len() < 600);
        assert!(truncated.contains("truncated"));
    }
}
