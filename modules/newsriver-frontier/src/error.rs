use thiserror::Error;

pub type Result<T> = std::result::Result<T, FrontierError>;

#[derive(Error, Debug)]
pub enum FrontierError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Url(#[from] newsriver_common::NewsriverError),
}
