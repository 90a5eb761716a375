use crate::semantic::SemanticSearchError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("contact not found")]
    NotFound,

    #[error("a contact with this number already exists at id {0}")]
    AlreadyExists(u64),

    #[error("{0}")]
    InvalidInput(String),

    #[error("semantic search: {0}")]
    Semantic(#[from] SemanticSearchError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
