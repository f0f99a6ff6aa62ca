use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("media server unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP request to media server failed: {0}")]
    RequestFailed(String),

    #[error("invalid response from media server: {0}")]
    InvalidResponse(String),

    #[error("media server returned an empty user list")]
    Empty,

    #[error("{0}")]
    Other(String),
}
