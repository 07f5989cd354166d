//! Error taxonomy shared by every stage of the upload pipeline

/// Result type for uploader operations
pub type Result<T> = std::result::Result<T, UploaderError>;

/// Error types for uploader operations
#[derive(thiserror::Error, Debug)]
pub enum UploaderError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("Video processing error: {0}")]
    VideoProcessing(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Upload error: {0}")]
    Upload(String),

    /// Upload failure the transport may try again (HTTP 5xx, dropped connections)
    #[error("Retriable upload error: {0}")]
    RetriableUpload(String),

    #[error("File operation error: {0}")]
    FileOperation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploaderError {
    /// Whether retrying the same request has a chance of succeeding
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::RetriableUpload(_) => true,
            Self::Http(e) => is_transient_http(e),
            _ => false,
        }
    }

    /// Classify an HTTP status returned by the hosting API
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if is_retriable_status(status) {
            Self::RetriableUpload(format!("HTTP {}: {}", status.as_u16(), body))
        } else {
            Self::Upload(format!("HTTP error {}: {}", status.as_u16(), body))
        }
    }
}

/// Network-level failures and server errors worth another attempt
pub fn is_transient_http(e: &reqwest::Error) -> bool {
    e.is_timeout()
        || e.is_connect()
        || e.is_request()
        || e.is_body()
        || e.status().map_or(false, |s| s.is_server_error())
}

/// 500, 502, 503 and 504 are the statuses the API documents as transient
pub fn is_retriable_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 500 | 502 | 503 | 504)
}
