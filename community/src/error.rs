use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommunityError {
    #[error("chat API unreachable: {0}")]
    Unreachable(String),

    #[error("chat API request failed: {0}")]
    RequestFailed(String),

    #[error("chat API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited by chat API, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("invalid response from chat API: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for CommunityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CommunityError::Unreachable(format!("request timed out: {e}"))
        } else if e.is_connect() {
            CommunityError::Unreachable(format!("connection failed: {e}"))
        } else if e.is_decode() {
            CommunityError::InvalidResponse(e.to_string())
        } else {
            CommunityError::RequestFailed(e.to_string())
        }
    }
}
