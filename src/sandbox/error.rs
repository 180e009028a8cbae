use thiserror::Error;

/// Errors talking to the sandbox orchestration API.
///
/// SECURITY: Error messages must NEVER contain the API token.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Token rejected by the API
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// API returned an error response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Network-level error (connection failed, timeout, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("sandbox not found: '{sandbox_id}'")]
    SandboxNotFound { sandbox_id: String },
}
