use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewsriverError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Document store error: {0}")]
    DocStore(String),

    #[error("Event stream error: {0}")]
    Stream(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
