use thiserror::Error;

/// Errors surfaced at the backend and configuration seams.
///
/// The session controller never propagates these to the user; it logs and
/// carries on. They exist so callers outside the controller (the binary,
/// tests) can tell failures apart.
#[derive(Debug, Error)]
pub enum VivaError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, VivaError>;
