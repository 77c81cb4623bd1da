use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocstoreError>;

#[derive(Error, Debug)]
pub enum DocstoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Document store API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
