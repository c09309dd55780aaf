#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    #[error("duplicate handle: {0}")]
    DuplicateHandle(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
