use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corruption: {0}")]
    Corrupt(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Duplicate key.")]
    DuplicateKey,
}

pub type Result<T> = std::result::Result<T, DbError>;
