//! Error handling for the tablesight session controller

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Capture permission denied by the user or device
    #[error("Capture permission denied: {0}")]
    PermissionDenied(String),

    /// No capture device available
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Capture device revoked externally (e.g. shared window closed)
    #[error("Capture device revoked: {0}")]
    DeviceRevoked(String),

    /// Detection service unreachable; callers treat this as zero detections
    #[error("Detection service unavailable: {0}")]
    DetectionUnavailable(String),

    /// Validation error (user-correctable, no partial write)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
