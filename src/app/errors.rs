#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("invalid post: {0}")]
    Validation(#[from] crate::posts::ValidationError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
