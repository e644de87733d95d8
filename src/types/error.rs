//! Error types for vellum
//!
//! One taxonomy for both subsystems, with an HTTP status mapping for the
//! delivery boundary. Surfaced messages never carry filesystem paths.

use hyper::StatusCode;

/// Main error type for shop operations
#[derive(Debug, thiserror::Error)]
pub enum ShopError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid file path")]
    InvalidPath,

    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Link expired")]
    ExpiredLink,

    #[error("Payment not confirmed: {0}")]
    PaymentNotConfirmed(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Build failure: {0}")]
    BuildFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidPath => StatusCode::BAD_REQUEST,
            Self::InvalidLink(_) => StatusCode::BAD_REQUEST,
            Self::ExpiredLink => StatusCode::GONE,
            Self::PaymentNotConfirmed(_) => StatusCode::FORBIDDEN,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::BuildFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

impl From<std::io::Error> for ShopError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ShopError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

impl From<zip::result::ZipError> for ShopError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::BuildFailure(err.to_string())
    }
}

/// Result type alias for shop operations
pub type Result<T> = std::result::Result<T, ShopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ShopError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ShopError::ExpiredLink.status_code(), StatusCode::GONE);
        assert_eq!(ShopError::InvalidLink("bad".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ShopError::PaymentNotConfirmed("unpaid".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ShopError::AccessDenied("no".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ShopError::InvalidPath.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_path_message_has_no_detail() {
        // Traversal attempts must not echo the offending path back
        let (status, body) = ShopError::InvalidPath.into_status_code_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.contains('/'));
    }
}
