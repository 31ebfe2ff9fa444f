use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] study_core::ConfigError),

    #[error("API error (HTTP {status}): {message}")]
    Status { status: StatusCode, message: String },
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    /// Build a status error, preferring the service's `{"error":{"message"}}`
    /// text over the raw body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        Self::Status { status, message }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Middleware(reqwest_middleware::Error::Reqwest(e)) => {
                e.is_timeout() || e.is_connect()
            }
            Self::Middleware(_) => false,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Json(_) | Self::Io(_) | Self::Config(_) => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_message_is_extracted() {
        let body = r#"{"error":{"message":"Invalid API key","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        let err = ApiError::from_response(StatusCode::UNAUTHORIZED, body);
        match &err {
            ApiError::Status { status, message } => {
                assert_eq!(*status, StatusCode::UNAUTHORIZED);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn plain_body_is_kept_verbatim() {
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, " upstream down \n");
        assert_eq!(err.to_string(), "API error (HTTP 502 Bad Gateway): upstream down");
        assert!(err.is_retryable());
    }

    #[test]
    fn middleware_failures_are_not_retried_again() {
        let err = ApiError::Middleware(reqwest_middleware::Error::Middleware(anyhow::anyhow!(
            "retry budget exhausted"
        )));
        assert!(!err.is_retryable());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn rate_limit_is_retryable() {
        let err = ApiError::from_response(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
    }
}
