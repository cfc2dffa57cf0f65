//! Security error taxonomy and its HTTP mapping.

use service_core::error::AppError;
use std::time::Duration;
use thiserror::Error;

/// Every way this layer can refuse a request. Authorization and rate-limit
/// variants short-circuit the pipeline; file variants are carried inside
/// structured validation results rather than raised.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Duration },

    #[error("File size {size} exceeds maximum allowed size of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File type '{mime}' is not allowed")]
    UnsupportedFileType { mime: String },

    #[error("Malicious content detected: {}", threats.join(", "))]
    MaliciousContentDetected { threats: Vec<String> },

    #[error("Identity service unreachable")]
    IdentityStoreUnavailable(String),

    #[error("Invalid or expired credentials")]
    IdentityStoreRejected(String),
}

impl From<SecurityError> for AppError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
            SecurityError::InsufficientPermissions => {
                AppError::Forbidden(anyhow::anyhow!("Insufficient permissions"))
            }
            SecurityError::RateLimitExceeded { retry_after } => AppError::TooManyRequests(
                "Rate limit exceeded".to_string(),
                Some(retry_after.as_secs()),
            ),
            SecurityError::FileTooLarge { .. }
            | SecurityError::UnsupportedFileType { .. }
            | SecurityError::MaliciousContentDetected { .. } => {
                AppError::BadRequest(anyhow::anyhow!("{}", err))
            }
            SecurityError::IdentityStoreUnavailable(_) => {
                AppError::ServiceUnavailable("Identity service unreachable".to_string())
            }
            SecurityError::IdentityStoreRejected(_) => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired credentials"))
            }
        }
    }
}
