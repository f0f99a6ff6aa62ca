use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("mapping file is corrupted: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}
