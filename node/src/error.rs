use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("engine error: {0}")]
    Engine(#[from] rosterlink_engine::EngineError),

    #[error("store error: {0}")]
    Store(#[from] rosterlink_store::StoreError),

    #[error("directory error: {0}")]
    Directory(#[from] rosterlink_directory::DirectoryError),

    #[error("community error: {0}")]
    Community(#[from] rosterlink_community::CommunityError),

    #[error("config error: {0}")]
    Config(String),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("status server error: {0}")]
    StatusServer(String),

    #[error("shutdown timeout")]
    ShutdownTimeout,
}
